/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

mod error;
mod stress;
mod types;

use crate::error::Result;
use crate::stress::{Element, MemoryStress, StressConfig};

use mem_runtime::runtime::hw_info::{self, ProcessorCache};

use std::io;
use std::mem::size_of;

fn main() -> Result<()> {
    let config = StressConfig::default();

    let hostname = hostname::get()
        .expect("Couldn't get hostname")
        .into_string()
        .expect("Couldn't convert hostname into UTF-8 string");
    let cpu_codename = hw_info::cpu_codename()?;

    eprintln!("DRAM stress workload on {} ({})", hostname, cpu_codename);
    eprintln!("{}", ProcessorCache {});
    eprintln!(
        "Buffer: {} elements x {} bytes, {} cache-line sweeps per trial, {} trials",
        config.buffer_len,
        size_of::<Element>(),
        config.stride_elements(),
        config.trials.0
    );

    let hw_line_bytes = ProcessorCache::cache_line_size();
    if hw_line_bytes != config.line_bytes {
        eprintln!(
            "Note: hardware reports {}-byte cache lines; keeping the {}-byte sweep granularity",
            hw_line_bytes, config.line_bytes
        );
    }

    let mut stress = MemoryStress::new(config)?;
    stress.run(Some(&mut io::stdout()))?;

    eprintln!("Checksum: {}", stress.sink_value());

    Ok(())
}
