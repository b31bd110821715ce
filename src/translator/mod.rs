// License below.
//! The dynamic binary translator: owns the guest CPU state, the code
//! buffer, and the translation cache, and drives the run loop that
//! lazily translates and executes one ARM basic block at a time.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![allow(static_mut_refs)]
#![warn(missing_docs)]

use std::process;

use crate::loader::GuestImage;

pub mod block;
pub mod cache;
pub mod codebuf;
pub mod condition;
pub mod decode;
pub mod dispatch;
pub mod emit;
pub mod error;
pub mod handlers;
pub mod state;

use block::translate_block;
use cache::TranslationCache;
use codebuf::{CodeBuffer, DEFAULT_CAPACITY};
use error::TranslatorError;
use state::{GuestState, NEXT_BB_HALT, SP};

/// Owns every piece of per-run translator state: the guest register
/// file, the RWX code buffer, and the guest-address-to-host-address
/// translation cache.
///
/// Lives behind a `Box` so its address is stable for the lifetime of the
/// run: generated code and the `bbTaken`/`bbNotTaken` callouts reach
/// back into it only through raw addresses baked in at emission time
/// ([`state::GuestState`]'s fields) or through [`dispatch::CURRENT_TRANSLATOR`].
pub struct Translator {
    state: Box<GuestState>,
    buf: CodeBuffer,
    cache: TranslationCache,
    image: GuestImage,
    verbose: bool,
}

impl Translator {
    /// Builds a translator for a loaded guest image, seeding the stack
    /// pointer from it. Registers other than `SP` start at zero, matching
    /// a freshly `execve`d ARM process with no C runtime argument setup.
    pub fn new(image: GuestImage, verbose: bool) -> Box<Translator> {
        let mut state = Box::new(GuestState::new());
        state.reg[SP] = image.stack_top;

        let buf = CodeBuffer::new(DEFAULT_CAPACITY).expect("failed to allocate the RWX code buffer");

        Box::new(Translator {
            state,
            buf,
            cache: TranslationCache::new(),
            image,
            verbose,
        })
    }

    fn state_base(&self) -> u32 { &*self.state as *const GuestState as u32 }

    /// Translates and runs the guest image's entry block, then keeps
    /// running until the guest program halts.
    ///
    /// Never returns under normal operation: the chain of exit-stub
    /// `CALL`s into [`dispatch::bb_taken`]/[`dispatch::bb_not_taken`] and
    /// back into freshly translated (or chained-to-directly) guest code
    /// only unwinds when the guest writes [`state::NEXT_BB_HALT`] into
    /// `nextBB`, at which point the process exits with the guest's `R0`.
    /// Each not-yet-chained block transition grows the host call stack
    /// by one frame; a hot loop's edges are chained to direct `JMP`s
    /// after their first traversal and stop doing so.
    pub fn run(self: Box<Self>) -> ! {
        let mut this = self;
        unsafe {
            dispatch::CURRENT_TRANSLATOR = &mut *this as *mut Translator;
        }

        let entry = this.image.entry;
        let state_base = this.state_base();
        let host = translate_block(
            &mut this.buf, &mut this.cache, &this.image, state_base,
            entry, dispatch::bb_taken_addr(), dispatch::bb_not_taken_addr(),
        ).unwrap_or_else(|e| fatal(e));

        if this.verbose {
            crate::debugdump::dump(&this.state);
        }

        let entry_fn = unsafe { this.buf.as_entry_point(host) };
        unsafe { entry_fn(); }

        unreachable!("bbTaken/bbNotTaken always end the process via NEXT_BB_HALT instead of returning");
    }

    /// Called from `bb_taken`/`bb_not_taken`: resolves (translating if
    /// necessary) the block at `nextBB`, chains the stub that led here
    /// to it when eligible, and transfers control — halting the process
    /// instead if the guest program has run off the end.
    fn handle_exit(&mut self, from_taken: bool) {
        if self.state.next_bb == NEXT_BB_HALT {
            process::exit(self.state.reg[0] as i32);
        }

        let next = self.state.next_bb;
        let state_base = self.state_base();
        let host = translate_block(
            &mut self.buf, &mut self.cache, &self.image, state_base,
            next, dispatch::bb_taken_addr(), dispatch::bb_not_taken_addr(),
        ).unwrap_or_else(|e| fatal(e));

        if let Err(e) = self.maybe_chain(from_taken, host) {
            fatal(e);
        }

        if self.verbose {
            crate::debugdump::dump(&self.state);
        }

        let entry_fn = unsafe { self.buf.as_entry_point(host) };
        unsafe { entry_fn(); }
    }

    /// Rewrites the `CALL rel32` recorded by the stub that produced this
    /// transition into a direct `JMP rel32`, if that stub recorded a
    /// nonzero source (i.e. the transition's target is a translation-time
    /// constant the stub is eligible to chain).
    fn maybe_chain(&mut self, from_taken: bool, target: u32) -> Result<(), TranslatorError> {
        let src = if from_taken { self.state.taken_src } else { self.state.untaken_src };
        if src == 0 {
            return Ok(());
        }

        let existing = self.buf.read_bytes_at(src, 5).to_vec();
        if existing[0] != 0xE8 {
            return Err(TranslatorError::BadPatchSite(src));
        }

        let rel = target.wrapping_sub(src + 5);
        let mut patched = [0u8; 5];
        patched[0] = 0xE9;
        patched[1..5].copy_from_slice(&rel.to_le_bytes());
        self.buf.patch_bytes_at(src, &patched);
        Ok(())
    }
}

/// Reports a fatal translation error and exits. Unsupported instructions,
/// a reserved condition field, an exhausted code buffer, or a corrupted
/// chaining site are all unrecoverable: there is no caller to propagate
/// a `Result` to once guest code is already executing.
fn fatal(e: TranslatorError) -> ! {
    log::error!("{}", e);
    process::exit(1);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loader::GuestImage;

    fn translator_with_empty_image() -> Box<Translator> {
        let image = GuestImage::new(vec![0u8; 64], 0, 0);
        Translator::new(image, false)
    }

    #[test]
    fn chaining_rewrites_call_to_jmp_with_correct_displacement() {
        let mut t = translator_with_empty_image();

        // Emit a stand-in CALL rel32 at the current cursor, the way an
        // exit stub would, and point taken_src at its opcode byte.
        let src = emit::emit_call_rel32(&mut t.buf, 0xDEAD_0000).unwrap();
        t.state.taken_src = src;

        let target = 0x1234_5678u32;
        t.maybe_chain(true, target).unwrap();

        let patched = t.buf.read_bytes_at(src, 5);
        assert_eq!(patched[0], 0xE9);
        let rel = u32::from_le_bytes(patched[1..5].try_into().unwrap());
        assert_eq!(rel, target.wrapping_sub(src + 5));
    }

    #[test]
    fn zero_src_is_never_patched() {
        let mut t = translator_with_empty_image();
        t.state.taken_src = 0;
        // No CALL was ever emitted at address 0; a zero src must be a
        // no-op rather than trying to read/patch it.
        assert!(t.maybe_chain(true, 0x9000).is_ok());
    }

    #[test]
    fn corrupted_patch_site_is_reported_not_silently_skipped() {
        let mut t = translator_with_empty_image();
        // Emit something that is not a CALL rel32 at this site.
        t.buf.append_byte(0x90).unwrap();
        t.buf.append_u32(0).unwrap();
        let src = t.buf.cursor() - 5;
        t.state.taken_src = src;

        match t.maybe_chain(true, 0x9000) {
            Err(TranslatorError::BadPatchSite(addr)) => assert_eq!(addr, src),
            other => panic!("expected BadPatchSite, got {:?}", other),
        }
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
