// License below.
//! The block builder: translates one ARM basic block into x86 machine
//! code, ending at the first control-transferring or PC-writing
//! instruction and appending the appropriate exit stub(s).
//!
//! A block's body is a straight-line sequence of translated
//! instructions, each optionally wrapped in an inverse-conditional skip.
//! The block ends the moment a handler reports a [`BlockEnd`] other than
//! `None`; for a conditional instruction that ends the block (a
//! conditional branch, or a conditional instruction that writes `PC`),
//! the inverse jump's landing site doubles as the not-taken exit stub,
//! so only one block is ever produced per call even though two
//! divergent guest continuations are possible.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use crate::loader::GuestImage;

use super::cache::TranslationCache;
use super::codebuf::CodeBuffer;
use super::decode::{decode, DecodedInstruction, Family};
use super::emit::{self, X86Reg};
use super::error::TranslatorError;
use super::handlers::{self, BlockEnd};
use super::state::{GuestState, PC};

/// Translates the ARM basic block starting at `guest_addr`, or returns
/// its already-cached host address without re-emitting anything.
///
/// `bb_taken_addr`/`bb_not_taken_addr` are the host addresses of the
/// `bbTaken`/`bbNotTaken` callouts every exit stub's `CALL` targets.
pub fn translate_block(
    buf: &mut CodeBuffer,
    cache: &mut TranslationCache,
    image: &GuestImage,
    state_base: u32,
    guest_addr: u32,
    bb_taken_addr: u32,
    bb_not_taken_addr: u32,
) -> Result<u32, TranslatorError> {
    if let Some(host) = cache.lookup(guest_addr) {
        return Ok(host);
    }

    let host_start = buf.cursor();
    cache.insert(guest_addr, host_start);

    let mut arm_addr = guest_addr;
    loop {
        let raw = image.fetch_u32(arm_addr);
        let decoded = decode(raw, arm_addr)?;

        let skip_placeholder = if decoded.cond.is_always() {
            None
        } else {
            Some(emit::emit_conditional_skip(buf, &decoded.cond.inverse_jump_opcode())?)
        };

        let end = dispatch_family(buf, state_base, &decoded, raw)?;

        if end != BlockEnd::None {
            emit_taken_stub(buf, state_base, end, bb_taken_addr)?;
        }

        if let Some(placeholder) = skip_placeholder {
            let body_end = buf.cursor();
            emit::patch_conditional_skip(buf, placeholder, body_end);

            if end != BlockEnd::None {
                emit_not_taken_stub(buf, state_base, arm_addr.wrapping_add(4), bb_not_taken_addr)?;
                break;
            }
        } else if end != BlockEnd::None {
            break;
        }

        arm_addr = arm_addr.wrapping_add(4);
    }

    Ok(host_start)
}

fn dispatch_family(buf: &mut CodeBuffer, state_base: u32, decoded: &DecodedInstruction, raw: u32) -> Result<BlockEnd, TranslatorError> {
    match decoded.family {
        Family::DpReg(op) => handlers::handle_dp_reg(buf, state_base, &op, raw, decoded.p_arm),
        Family::DpImm(op) => handlers::handle_dp_imm(buf, state_base, &op, decoded.p_arm),
        Family::LsImm(op) => handlers::handle_ls_imm(buf, state_base, &op, decoded.p_arm),
        Family::LsReg(op) => handlers::handle_ls_reg(buf, state_base, &op, raw, decoded.p_arm),
        Family::LsMult(op) => handlers::handle_ls_mult(buf, state_base, &op),
        Family::Branch(op) => handlers::handle_branch(buf, state_base, &op, decoded.p_arm),
        Family::Swi | Family::Unsupported => handlers::handle_unsupported(raw, decoded.p_arm),
    }
}

/// Emits the "taken" exit stub: writes `nextBB`, then a chaining-eligible
/// or inert `CALL bbTaken` depending on whether the target is a
/// translation-time constant.
fn emit_taken_stub(buf: &mut CodeBuffer, state_base: u32, end: BlockEnd, bb_taken_addr: u32) -> Result<(), TranslatorError> {
    match end {
        BlockEnd::Branch(target) => {
            emit::emit_mov_mem_imm32(buf, next_bb_addr(state_base), target)?;
            emit_src_and_call(buf, taken_src_addr(state_base), true, bb_taken_addr)?;
        }
        BlockEnd::PcWritten => {
            emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, emit::reg_addr(state_base, PC))?;
            emit::emit_mov_mem_from_reg(buf, X86Reg::Eax, next_bb_addr(state_base))?;
            emit_src_and_call(buf, taken_src_addr(state_base), false, bb_taken_addr)?;
        }
        BlockEnd::None => unreachable!("emit_taken_stub is only called once a handler reports a real block end"),
    }
    Ok(())
}

/// Emits the "not taken" exit stub that a conditional branch or
/// conditional PC-write's inverse jump lands on: the fallthrough guest
/// address is always a translation-time constant, so this is always
/// chaining-eligible.
fn emit_not_taken_stub(buf: &mut CodeBuffer, state_base: u32, fallthrough_addr: u32, bb_not_taken_addr: u32) -> Result<(), TranslatorError> {
    emit::emit_mov_mem_imm32(buf, next_bb_addr(state_base), fallthrough_addr)?;
    emit_src_and_call(buf, untaken_src_addr(state_base), true, bb_not_taken_addr)
}

/// Records the `CALL` operand's host address into a `takenSrc`/
/// `untakenSrc` field (or zero, for stubs chaining must never rewrite)
/// and emits the `CALL` itself. The constant written when chainable is
/// computed from the fixed 10-byte length of the `MOV [mem], imm32`
/// that stores it, so the store and the `CALL` it describes always land
/// exactly back to back.
fn emit_src_and_call(buf: &mut CodeBuffer, src_field_addr: u32, chainable: bool, callout_addr: u32) -> Result<(), TranslatorError> {
    const STORE_INSTR_LEN: u32 = 10; // C7 /0, modrm, disp32, imm32
    if chainable {
        let call_site = buf.cursor() + STORE_INSTR_LEN;
        emit::emit_mov_mem_imm32(buf, src_field_addr, call_site)?;
        let actual = emit::emit_call_rel32(buf, callout_addr)?;
        debug_assert_eq!(actual, call_site, "store/CALL pair drifted apart");
    } else {
        emit::emit_mov_mem_imm32(buf, src_field_addr, 0)?;
        emit::emit_call_rel32(buf, callout_addr)?;
    }
    Ok(())
}

fn next_bb_addr(state_base: u32) -> u32 { state_base + GuestState::offset_of_next_bb() as u32 }
fn taken_src_addr(state_base: u32) -> u32 { state_base + GuestState::offset_of_taken_src() as u32 }
fn untaken_src_addr(state_base: u32) -> u32 { state_base + GuestState::offset_of_untaken_src() as u32 }

#[cfg(test)]
mod test {
    use super::*;

    // Builds a tiny image out of raw ARM words and returns it alongside
    // the host address of word 0 (`img.entry`) — guest addresses are
    // host pointers into `img.bytes`, never the small vaddr-relative
    // offsets a real ELF's PT_LOAD headers use.
    fn image_of(words: &[u32]) -> (GuestImage, u32) {
        let mut bytes = vec![0u8; words.len() * 4 + 16];
        for (i, w) in words.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        let img = GuestImage::new(bytes, 0, 0);
        let entry = img.entry;
        (img, entry)
    }

    const STATE_BASE: u32 = 0x9000;
    const BB_TAKEN: u32 = 0x1000_0000;
    const BB_NOT_TAKEN: u32 = 0x2000_0000;

    #[test]
    fn second_translation_of_the_same_address_is_a_cache_hit() {
        let (img, addr) = image_of(&[0xEAFF_FFFE]); // B self
        let mut buf = CodeBuffer::new(4096).unwrap();
        let mut cache = TranslationCache::new();

        let first = translate_block(&mut buf, &mut cache, &img, STATE_BASE, addr, BB_TAKEN, BB_NOT_TAKEN).unwrap();
        let cursor_after_first = buf.cursor();
        let second = translate_block(&mut buf, &mut cache, &img, STATE_BASE, addr, BB_TAKEN, BB_NOT_TAKEN).unwrap();

        assert_eq!(first, second);
        assert_eq!(buf.cursor(), cursor_after_first);
    }

    #[test]
    fn unconditional_branch_ends_the_block_immediately() {
        // MOV R0,#1 ; MOV R1,#2 ; B self. The block builder must stop at
        // the branch and never fetch a fourth (nonexistent) word.
        let (img, addr) = image_of(&[0xE3A0_0001, 0xE3A0_1002, 0xEAFF_FFFE]);
        let mut buf = CodeBuffer::new(4096).unwrap();
        let mut cache = TranslationCache::new();

        let host = translate_block(&mut buf, &mut cache, &img, STATE_BASE, addr, BB_TAKEN, BB_NOT_TAKEN).unwrap();
        assert_eq!(cache.lookup(addr), Some(host));
    }

    #[test]
    fn chainable_exit_stub_leaves_a_call_at_the_recorded_source() {
        let (img, addr) = image_of(&[0xEAFF_FFFE]); // B self, unconditional
        let mut buf = CodeBuffer::new(4096).unwrap();
        let mut cache = TranslationCache::new();

        translate_block(&mut buf, &mut cache, &img, STATE_BASE, addr, BB_TAKEN, BB_NOT_TAKEN).unwrap();

        // taken_src_addr's value was itself baked into the stream as an
        // immediate; recompute where the CALL opcode byte should be and
        // check it really is 0xE8 there.
        let end = buf.cursor();
        assert_eq!(buf.read_bytes_at(end - 5, 1), &[0xE8]);
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
