/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2021, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

use mem_runtime::runtime::memory::MmapMemory;
use std::error::Error;

#[test]
fn test_write_read_round_trip() -> Result<(), Box<dyn Error>> {
    let len = 1024_usize;
    let mut mem = MmapMemory::<i32>::new(len, None)?;
    assert_eq!(mem.len(), len);
    assert!(!mem.is_empty());

    mem.as_mut_slice()
        .iter_mut()
        .zip(0..)
        .for_each(|(x, i)| *x = i);

    assert_eq!(mem.as_slice()[0], 0);
    assert_eq!(mem.as_slice()[len / 2], (len / 2) as i32);
    assert_eq!(mem.as_slice()[len - 1], (len - 1) as i32);

    Ok(())
}

#[test]
fn test_fresh_mapping_is_zeroed() -> Result<(), Box<dyn Error>> {
    let mem = MmapMemory::<i32>::new(4096, None)?;
    assert!(mem.as_slice().iter().all(|&x| x == 0));

    Ok(())
}

#[test]
fn test_zero_length_is_rejected() {
    assert!(MmapMemory::<i32>::new(0, None).is_err());
}

#[test]
fn test_oversized_allocation_fails() {
    // 2^61 bytes exceed the virtual address range of current hardware
    let res = MmapMemory::<i32>::new(usize::MAX / 8, None);
    assert!(res.is_err());
}

#[test]
fn test_byte_size_overflow_fails() {
    let res = MmapMemory::<i32>::new(usize::MAX, None);
    assert!(res.is_err());
}

#[test]
fn test_small_page_advice() {
    // Kernels built without transparent huge page support refuse the advice
    if let Ok(mut mem) = MmapMemory::<i32>::new(4096, Some(false)) {
        mem.as_mut_slice().iter_mut().for_each(|x| *x = 1);
        assert_eq!(mem.as_slice()[4095], 1);
    }
}
