// License below.
//! The code buffer: a contiguous writable+executable region that
//! translated x86 bytes are appended to, and later self-modified in
//! place by the chaining mechanism.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::io;
use std::ptr;
use std::slice;

use super::error::TranslatorError;

/// Default capacity of the code buffer: 32 MiB, enough for tens of
/// thousands of translated basic blocks without reallocating.
pub const DEFAULT_CAPACITY: usize = 32 * 1024 * 1024;

/// A append-only (except for chaining patches), simultaneously
/// writable-and-executable byte buffer that translated blocks are
/// emitted into.
///
/// The buffer is allocated once with `mmap(PROT_READ|PROT_WRITE|PROT_EXEC)`
/// and never reallocated: every emitted instruction bakes the buffer's
/// base address into absolute displacements, so moving the allocation
/// would invalidate every block translated so far.
pub struct CodeBuffer {
    base: *mut u8,
    capacity: usize,
    cursor: usize,
}

// Single-threaded translator; the buffer is never shared across threads.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Allocates a fresh RWX code buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> io::Result<CodeBuffer> {
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(CodeBuffer { base: base as *mut u8, capacity, cursor: 0 })
    }

    /// Current append cursor as a host address.
    ///
    /// This is the address a new block's first emitted byte will land
    /// at, and the value recorded into the translation cache when a
    /// block starts.
    pub fn cursor(&self) -> u32 { (self.base as usize + self.cursor) as u32 }

    /// Bytes remaining before the buffer is exhausted.
    pub fn remaining(&self) -> usize { self.capacity - self.cursor }

    /// Appends one byte, advancing the cursor.
    pub fn append_byte(&mut self, b: u8) -> Result<(), TranslatorError> {
        if self.cursor >= self.capacity { return Err(TranslatorError::ExhaustedCodeBuffer); }
        unsafe { *self.base.add(self.cursor) = b; }
        self.cursor += 1;
        Ok(())
    }

    /// Appends a slice of bytes, advancing the cursor.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<(), TranslatorError> {
        if self.remaining() < bytes.len() { return Err(TranslatorError::ExhaustedCodeBuffer); }
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(self.cursor), bytes.len()); }
        self.cursor += bytes.len();
        Ok(())
    }

    /// Appends a little-endian `u32`, advancing the cursor by 4. Used
    /// both for immediate operands and for rel32/disp32 placeholders
    /// that are back-patched later.
    pub fn append_u32(&mut self, v: u32) -> Result<(), TranslatorError> {
        self.append_bytes(&v.to_le_bytes())
    }

    /// Overwrites 4 bytes at an absolute host address with a
    /// little-endian `u32`. Used to back-patch the conditional-prelude
    /// displacement once a guarded instruction's body length is known,
    /// and to write chaining jump targets.
    ///
    /// # Panics
    /// If `host_addr` does not fall within the already-emitted portion
    /// of the buffer.
    pub fn patch_u32_at(&mut self, host_addr: u32, v: u32) {
        let off = self.offset_of(host_addr);
        assert!(off + 4 <= self.cursor, "patch site outside emitted region");
        unsafe { ptr::copy_nonoverlapping(v.to_le_bytes().as_ptr(), self.base.add(off), 4); }
    }

    /// Overwrites `bytes.len()` bytes at an absolute host address.
    /// Used by chaining to rewrite a `CALL rel32` into a `JMP rel32`,
    /// the one place this buffer's aliasing rules are deliberately
    /// violated: other references into already-emitted code remain
    /// valid while this call mutates it in place.
    pub fn patch_bytes_at(&mut self, host_addr: u32, bytes: &[u8]) {
        let off = self.offset_of(host_addr);
        assert!(off + bytes.len() <= self.cursor, "patch site outside emitted region");
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(off), bytes.len()); }
    }

    /// Reads back `len` bytes at an absolute host address, for
    /// verifying a patch site's current contents before rewriting it
    /// (chaining requires the five bytes to already match `CALL rel32`).
    pub fn read_bytes_at(&self, host_addr: u32, len: usize) -> &[u8] {
        let off = self.offset_of(host_addr);
        assert!(off + len <= self.cursor, "read outside emitted region");
        unsafe { slice::from_raw_parts(self.base.add(off), len) }
    }

    /// Casts a host address inside this buffer to a callable, no-argument,
    /// C-ABI function pointer.
    ///
    /// # Safety
    /// The caller must ensure `host_addr` is the first byte of a
    /// previously sealed, valid translated block (or a callout), and that
    /// calling it will not smuggle guest state on the host stack across
    /// the boundary.
    pub unsafe fn as_entry_point(&self, host_addr: u32) -> unsafe extern "C" fn() {
        std::mem::transmute::<usize, unsafe extern "C" fn()>(host_addr as usize)
    }

    fn offset_of(&self, host_addr: u32) -> usize {
        (host_addr as usize).wrapping_sub(self.base as usize)
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.base as *mut libc::c_void, self.capacity); }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cursor_is_monotonic_within_a_run() {
        let mut buf = CodeBuffer::new(4096).unwrap();
        let c0 = buf.cursor();
        buf.append_byte(0x90).unwrap();
        let c1 = buf.cursor();
        buf.append_bytes(&[0x90, 0x90, 0x90]).unwrap();
        let c2 = buf.cursor();
        assert!(c1 > c0);
        assert!(c2 > c1);
    }

    #[test]
    fn exhausted_buffer_is_reported_not_panicked() {
        let mut buf = CodeBuffer::new(2).unwrap();
        buf.append_byte(0x90).unwrap();
        buf.append_byte(0x90).unwrap();
        match buf.append_byte(0x90) {
            Err(TranslatorError::ExhaustedCodeBuffer) => {},
            other => panic!("expected ExhaustedCodeBuffer, got {:?}", other),
        }
    }

    #[test]
    fn patch_round_trips_through_read_back() {
        let mut buf = CodeBuffer::new(64).unwrap();
        let start = buf.cursor();
        buf.append_u32(0xAAAAAAAA).unwrap();
        buf.patch_u32_at(start, 0xDEADBEEF);
        assert_eq!(buf.read_bytes_at(start, 4), &0xDEADBEEFu32.to_le_bytes());
    }
}


/*
Licensed to the Apache Software Foundation (ASF) under one
or more contributor license agreements.  See the NOTICE file
distributed with this work for additional information
regarding copyright ownership.  The ASF licenses this file
to you under the Apache License, Version 2.0 (the
"License"); you may not use this file except in compliance
with the License.  You may obtain a copy of the License at

  http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing,
software distributed under the License is distributed on an
"AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
KIND, either express or implied.  See the License for the
specific language governing permissions and limitations
under the License.
*/
