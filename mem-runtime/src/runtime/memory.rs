/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

use crate::error::{ErrorKind, Result, ResultExt};

use libc::{madvise, mmap, munmap};

use std::io::Error as IoError;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr;

/// A contiguous memory region that is dynamically allocated with `mmap`.
///
/// == Transparent Huge Pages ==
///
/// Small pages are advised using `madvise` when the `huge_pages` flag is set
/// to `false`. Huge pages are advised when the flag is set to `true`. However,
/// the actual behavior depends on OS configuration options. Specifying `None`
/// uses the default OS setting.
///
/// - `/sys/kernel/mm/transparent_hugepage/enabled` controls the default page
/// size. It can be set to `never`, `madvise`, or `always`. The settings
/// `madvise` and `always` set the default page size to small pages and huge
/// pages, respectively. Both of these options allow `madvise` to override the
/// default. In contrast, the setting `never` specifies small pages without an
/// override option.
///
/// See the [Linux kernel documentation](https://www.kernel.org/doc/Documentation/vm/transhuge.txt)
/// for more details.
///
/// == Memory Alignment ==
///
/// `mmap` with `MMAP_ANONYMOUS` allocates pages. Separate alignment for
/// cacheline alignment is not necessary.
#[derive(Debug)]
pub struct MmapMemory<T> {
    pointer: *mut T,
    len: usize,
}

impl<T> MmapMemory<T> {
    /// Allocates a new memory region with the specified capacity.
    ///
    /// Allocation failure is not recoverable. The caller is expected to
    /// propagate the error and terminate.
    pub fn new(len: usize, huge_pages: Option<bool>) -> Result<Self> {
        if len == 0 {
            return Err(
                ErrorKind::InvalidArgument("Buffer length must be non-zero".to_string()).into(),
            );
        }

        let size = len.checked_mul(size_of::<T>()).ok_or_else(|| {
            ErrorKind::IntegerOverflow("Buffer byte size exceeds the address space".to_string())
        })?;

        // Allocate memory with mmap
        let pointer = unsafe {
            mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                0,
                0,
            )
        };
        if pointer == libc::MAP_FAILED {
            return std::result::Result::Err(IoError::last_os_error())
                .chain_err(|| ErrorKind::AllocationFailed(size));
        }

        // Enable or disable transparent huge pages if the option is set
        if let Some(hp_option) = huge_pages {
            let advice = if hp_option {
                libc::MADV_HUGEPAGE
            } else {
                libc::MADV_NOHUGEPAGE
            };
            unsafe {
                if madvise(pointer, size, advice) == -1 {
                    let err = IoError::last_os_error();
                    munmap(pointer, size);
                    return std::result::Result::Err(err).chain_err(|| {
                        ErrorKind::RuntimeError("Failed to madvise memory".to_string())
                    });
                }
            }
        }

        Ok(Self {
            pointer: pointer as *mut T,
            len,
        })
    }

    /// Extracts a slice of the entire memory region.
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.pointer, self.len) }
    }

    /// Extracts a mutable slice of the entire memory region.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.pointer, self.len) }
    }

    /// Returns the number of elements in the memory region.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Deref for MmapMemory<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for MmapMemory<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.pointer, self.len) }
    }
}

impl<T> Drop for MmapMemory<T> {
    fn drop(&mut self) {
        // In drop() method, we can only handle error by panicking.
        let size = self.len * size_of::<T>();
        unsafe {
            if munmap(self.pointer as *mut libc::c_void, size) == -1 {
                std::result::Result::Err::<(), _>(IoError::last_os_error())
                    .expect("Failed to munmap memory");
            }
        }
    }
}
