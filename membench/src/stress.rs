/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

use crate::error::{ErrorKind, Result};
use crate::types::TrialCount;

use mem_runtime::runtime::memory::MmapMemory;

use std::io;
use std::mem::size_of;
use std::ptr;

/// Buffer element type.
pub type Element = i32;

const ELEMENT_BYTES: usize = size_of::<Element>();

/// Upper bound of the values produced by the write pass.
const WRITE_VALUE_RANGE: u64 = 1024;

/// Workload geometry.
///
/// The defaults reproduce the reference constants exactly: a 2^30-element
/// buffer of 4-byte elements (4 GiB), 100 trials, and 64-byte cache lines.
/// The geometry is fixed at compile time; there is no command-line or
/// environment surface to change it, keeping separate profiling runs
/// comparable.
#[derive(Clone, Debug)]
pub struct StressConfig {
    /// Number of buffer elements
    pub buffer_len: usize,

    /// Number of write-then-read trials
    pub trials: TrialCount,

    /// Cache line width in bytes
    pub line_bytes: usize,

    /// Transparent huge page advice for the buffer mapping
    pub huge_pages: Option<bool>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            buffer_len: 1 << 30,
            trials: TrialCount(100),
            line_bytes: 64,
            huge_pages: None,
        }
    }
}

impl StressConfig {
    /// Elements per cache line; the step width of one read sweep.
    pub fn stride_elements(&self) -> usize {
        self.line_bytes / ELEMENT_BYTES
    }
}

/// Accumulator that all read values are folded into.
///
/// Each fold is a volatile read-modify-write, so the optimizer must treat
/// every accumulation as externally observable and cannot eliminate or hoist
/// the buffer reads that feed it. The final value carries no correctness
/// contract.
#[derive(Debug, Default)]
pub struct Sink {
    value: i64,
}

impl Sink {
    #[inline]
    fn fold(&mut self, item: Element) {
        let cell = &mut self.value as *mut i64;
        unsafe { ptr::write_volatile(cell, ptr::read_volatile(cell) + i64::from(item)) };
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

/// The access-pattern generator.
///
/// Owns the buffer for the full process lifetime and executes the configured
/// number of trials. Each trial writes the entire buffer sequentially and
/// then re-reads it in cache-line-strided sweeps, one sweep per intra-line
/// element offset. The memory traffic itself is the output; the generator
/// reports nothing except one progress line per trial.
pub struct MemoryStress {
    buffer: MmapMemory<Element>,
    config: StressConfig,
    sink: Sink,
}

impl MemoryStress {
    /// Validates the geometry and allocates the buffer.
    ///
    /// Allocation failure is the single error condition of the workload. It
    /// is fatal and leaves no partial state behind.
    pub fn new(config: StressConfig) -> Result<Self> {
        if config.line_bytes == 0 || config.line_bytes % ELEMENT_BYTES != 0 {
            return Err(ErrorKind::InvalidArgument(format!(
                "Cache line width must be a non-zero multiple of {} bytes",
                ELEMENT_BYTES
            ))
            .into());
        }

        let buffer = MmapMemory::new(config.buffer_len, config.huge_pages)?;

        Ok(Self {
            buffer,
            config,
            sink: Sink::default(),
        })
    }

    /// Runs all trials in order.
    ///
    /// Emits one line per trial into `progress` before the trial's write pass
    /// starts. Within a trial, the write pass completes over the full buffer
    /// before the read pass begins.
    pub fn run<W>(&mut self, mut progress: Option<&mut W>) -> Result<()>
    where
        W: io::Write,
    {
        let TrialCount(trials) = self.config.trials;
        let stride = self.config.stride_elements();

        for trial in 0..trials {
            if let Some(w) = progress.as_mut() {
                writeln!(w, "Run {}", trial)?;
            }

            write_pass(self.buffer.as_mut_slice(), trial);
            read_pass(self.buffer.as_slice(), stride, &mut self.sink);
        }

        Ok(())
    }

    /// Returns the accumulator value.
    pub fn sink_value(&self) -> i64 {
        self.sink.value()
    }
}

/// The per-element write value: `(index * trial) mod 1024`.
///
/// Depends on the trial so that successive trials never write bit-identical
/// data.
#[inline]
fn write_value(index: u64, trial: u32) -> Element {
    (index.wrapping_mul(u64::from(trial)) % WRITE_VALUE_RANGE) as Element
}

/// Writes every element in increasing index order.
#[inline(never)]
fn write_pass(buffer: &mut [Element], trial: u32) {
    buffer
        .iter_mut()
        .zip(0..)
        .for_each(|(item, i)| *item = write_value(i, trial));
}

/// One strided sweep per intra-line element offset.
///
/// Sweep `k` starts at element `k` and steps a full cache line, so no two
/// consecutive accesses of one sweep touch the same line, while successive
/// sweeps revisit nearby-but-distinct addresses. Across all sweeps, each
/// element is read exactly once, under the sweep matching its intra-line
/// offset.
#[inline(never)]
fn read_pass(buffer: &[Element], stride: usize, sink: &mut Sink) {
    for k in 0..stride {
        for i in (k..buffer.len()).step_by(stride) {
            sink.fold(unsafe { *buffer.get_unchecked(i) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(buffer_len: usize, trials: u32, line_bytes: usize) -> StressConfig {
        StressConfig {
            buffer_len,
            trials: TrialCount(trials),
            line_bytes,
            huge_pages: None,
        }
    }

    #[test]
    fn default_config_matches_reference_constants() {
        let config = StressConfig::default();
        assert_eq!(config.buffer_len, 1 << 30);
        assert_eq!(config.trials, TrialCount(100));
        assert_eq!(config.line_bytes, 64);
        assert_eq!(config.stride_elements(), 16);
        assert_eq!(config.huge_pages, None);
    }

    #[test]
    fn write_pass_covers_every_element() {
        let mut buffer = vec![0; 16];
        write_pass(&mut buffer, 3);

        for (i, &item) in buffer.iter().enumerate() {
            assert_eq!(item, ((i as u64 * 3) % 1024) as Element);
        }
    }

    #[test]
    fn write_pass_trial_zero_writes_zeroes() {
        let mut buffer = vec![-1; 8];
        write_pass(&mut buffer, 0);

        assert!(buffer.iter().all(|&item| item == 0));
    }

    #[test]
    fn write_value_wraps_at_range() {
        assert_eq!(write_value(1024, 1), 0);
        assert_eq!(write_value(1025, 1), 1);
        assert_eq!(write_value(2, 513), 2);
    }

    #[test]
    fn distinct_trials_write_distinct_data() {
        let mut first = vec![0; 8];
        let mut second = vec![0; 8];
        write_pass(&mut first, 1);
        write_pass(&mut second, 2);

        assert_ne!(first, second);
    }

    #[test]
    fn read_pass_accumulates_sum_of_all_elements() {
        // Trial 1 makes element i hold the value i
        let mut buffer = vec![0; 16];
        write_pass(&mut buffer, 1);

        let mut sink = Sink::default();
        read_pass(&buffer, 4, &mut sink);

        assert_eq!(sink.value(), (0..16).sum::<i64>());
    }

    #[test]
    fn read_pass_visits_each_index_exactly_once() {
        // With each element holding a distinct bit, the accumulated value
        // identifies the visited multiset exactly
        let buffer: Vec<Element> = (0..16).map(|i| 1 << i).collect();

        let mut sink = Sink::default();
        read_pass(&buffer, 4, &mut sink);

        assert_eq!(sink.value(), (1 << 16) - 1);
    }

    #[test]
    fn read_pass_sweeps_are_phase_shifted() {
        // Stride-2 sweeps over [0, 2, 4, 6]: sweep 0 visits indices 0 and 2
        // (values 0 and 4), sweep 1 visits indices 1 and 3 (values 2 and 6)
        let mut buffer = vec![0; 4];
        write_pass(&mut buffer, 2);
        assert_eq!(buffer, [0, 2, 4, 6]);

        let mut sink = Sink::default();
        read_pass(&buffer, 2, &mut sink);

        assert_eq!(sink.value(), 12);
    }

    #[test]
    fn sink_folds_accumulate() {
        let mut sink = Sink::default();
        sink.fold(5);
        sink.fold(-2);

        assert_eq!(sink.value(), 3);
    }

    #[test]
    fn run_emits_one_progress_line_per_trial() {
        let mut stress = MemoryStress::new(small_config(64, 5, 8)).unwrap();

        let mut out = Vec::new();
        stress.run(Some(&mut out)).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, ["Run 0", "Run 1", "Run 2", "Run 3", "Run 4"]);
    }

    #[test]
    fn run_accumulates_across_trials() {
        // Trial 0 writes zeroes; trial 1 writes 0..8
        let mut stress = MemoryStress::new(small_config(8, 2, 8)).unwrap();
        stress.run::<io::Sink>(None).unwrap();

        assert_eq!(stress.sink_value(), (0..8).sum::<i64>());
    }

    #[test]
    fn run_without_trials_produces_no_output() {
        let mut stress = MemoryStress::new(small_config(8, 0, 8)).unwrap();

        let mut out = Vec::new();
        stress.run(Some(&mut out)).unwrap();

        assert!(out.is_empty());
        assert_eq!(stress.sink_value(), 0);
    }

    #[test]
    fn rejects_invalid_line_width() {
        assert!(MemoryStress::new(small_config(16, 1, 0)).is_err());
        assert!(MemoryStress::new(small_config(16, 1, 6)).is_err());
    }

    #[test]
    fn rejects_empty_buffer() {
        assert!(MemoryStress::new(small_config(0, 1, 64)).is_err());
    }
}
