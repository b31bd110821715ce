// License below.
//! x86 machine-code emission helpers built on top of the code buffer.
//!
//! These are thin, deliberately low-level helpers: MOD-R/M encoding for
//! the one addressing mode the translator needs (`[disp32]`, an absolute
//! displacement with no base or index register, since every guest
//! register lives at a fixed address inside `GuestState`), a handful of
//! whole-instruction emitters for the ALU/move/compare forms the
//! handlers use, and the flag-shadow save/restore sequence.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use super::codebuf::CodeBuffer;
use super::error::TranslatorError;
use super::state::GuestState;

/// x86 general-purpose register encoding (used only as MOD-R/M `reg` field
/// operands; the translator never allocates guest registers into host
/// registers, every guest value round-trips through `GuestState` memory).
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum X86Reg { Eax = 0, Ecx = 1, Edx = 2, Ebx = 3, Esp = 4, Ebp = 5, Esi = 6, Edi = 7 }

/// Appends a `MOV r32, [disp32]` (opcode `8B /r`), loading a 32-bit
/// guest field into a host scratch register.
pub fn emit_mov_reg_from_mem(buf: &mut CodeBuffer, dst: X86Reg, addr: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x8B)?;
    buf.append_byte(modrm_disp32(dst))?;
    buf.append_u32(addr)
}

/// Appends a `MOV [disp32], r32` (opcode `89 /r`), storing a host
/// scratch register into a 32-bit guest field.
pub fn emit_mov_mem_from_reg(buf: &mut CodeBuffer, src: X86Reg, addr: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x89)?;
    buf.append_byte(modrm_disp32(src))?;
    buf.append_u32(addr)
}

/// Appends a `MOV r32, imm32` (opcode `B8+r`).
pub fn emit_mov_reg_imm32(buf: &mut CodeBuffer, dst: X86Reg, imm: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0xB8 + dst as u8)?;
    buf.append_u32(imm)
}

/// The eight x86 "group 1" ALU operations, sharing one opcode layout:
/// `digit` selects the operation both as `/digit` in the `80`/`81`
/// immediate-form opcodes and, via `0x01 + digit * 8`, as the opcode of
/// the `Ev, Gv` (memory destination, register source) form.
pub const ADD: u8 = 0;
pub const OR: u8 = 1;
pub const ADC: u8 = 2;
pub const SBB: u8 = 3;
pub const AND: u8 = 4;
pub const SUB: u8 = 5;
pub const XOR: u8 = 6;
pub const CMP: u8 = 7;

/// Appends `<op> [disp32], imm32` (opcode `81 /digit`): applies a group-1
/// ALU operation with an immediate source and a guest-register memory
/// destination.
pub fn emit_group1_mem_imm32(buf: &mut CodeBuffer, digit: u8, addr: u32, imm: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x81)?;
    buf.append_byte(modrm_digit_disp32(digit))?;
    buf.append_u32(addr)?;
    buf.append_u32(imm)
}

/// Appends `<op> [disp32], r32` (opcode `0x01 + digit*8`, `/r` form):
/// applies a group-1 ALU operation with a host scratch register source
/// and a guest-register memory destination. Used by the shifted-operand
/// handlers once the barrel-shifter result has been computed into a
/// scratch register.
pub fn emit_group1_mem_reg(buf: &mut CodeBuffer, digit: u8, addr: u32, src: X86Reg) -> Result<(), TranslatorError> {
    buf.append_byte(0x01 + digit * 8)?;
    buf.append_byte(modrm_disp32(src))?;
    buf.append_u32(addr)
}

/// Appends `PUSH [disp32]; POPF` (opcodes `FF /6`, `9D`): restores the
/// x86 EFLAGS register from the saved flag shadow immediately before
/// executing a data-processing instruction that depends on carry-in
/// (`ADC`/`SBC`/`RSC`) or is itself a Jcc prelude.
pub fn emit_restore_flags(buf: &mut CodeBuffer, flags_shadow_addr: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0xFF)?;
    buf.append_byte(modrm_digit_disp32(6, flags_shadow_addr))?;
    buf.append_u32(flags_shadow_addr)?;
    buf.append_byte(0x9D) // POPF
}

/// Appends `PUSHF; POP [disp32]` (opcodes `9C`, `8F /0`): captures the
/// freshly computed x86 EFLAGS into the flag shadow immediately after a
/// data-processing instruction with `S=1`.
pub fn emit_save_flags(buf: &mut CodeBuffer, flags_shadow_addr: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x9C)?; // PUSHF
    buf.append_byte(0x8F)?;
    buf.append_byte(modrm_digit_disp32(0, flags_shadow_addr))?;
    buf.append_u32(flags_shadow_addr)
}

/// Appends `MOV [disp32], imm32` (opcode `C7 /0`): stores a compile-time
/// constant into a guest field, used to materialize `PC` on demand, to
/// write `LR` on `BL`, and by exit stubs to set `nextBB`/`takenSrc`/
/// `untakenSrc` to known values.
pub fn emit_mov_mem_imm32(buf: &mut CodeBuffer, addr: u32, imm: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0xC7)?;
    buf.append_byte(modrm_digit_disp32(0, addr))?;
    buf.append_u32(addr)?;
    buf.append_u32(imm)
}

/// Appends `MOV r32, r32` (opcode `89 /r`, reg-reg form).
pub fn emit_mov_reg_reg(buf: &mut CodeBuffer, dst: X86Reg, src: X86Reg) -> Result<(), TranslatorError> {
    buf.append_byte(0x89)?;
    buf.append_byte(modrm_reg_reg(src, dst))
}

/// Appends a group-1 ALU op `<op> dst, src` (opcode `0x01 + digit*8`,
/// reg-reg `/r` form): `dst := dst <op> src`.
pub fn emit_group1_reg_reg(buf: &mut CodeBuffer, digit: u8, dst: X86Reg, src: X86Reg) -> Result<(), TranslatorError> {
    buf.append_byte(0x01 + digit * 8)?;
    buf.append_byte(modrm_reg_reg(src, dst))
}

/// Appends `NOT r32` (opcode `F7 /2`): one's-complement in place.
pub fn emit_not_reg(buf: &mut CodeBuffer, reg: X86Reg) -> Result<(), TranslatorError> {
    buf.append_byte(0xF7)?;
    buf.append_byte(0xC0 | (2 << 3) | reg as u8)
}

/// Appends `NEG r32` (opcode `F7 /3`): two's-complement negation in place.
pub fn emit_neg_reg(buf: &mut CodeBuffer, reg: X86Reg) -> Result<(), TranslatorError> {
    buf.append_byte(0xF7)?;
    buf.append_byte(0xC0 | (3 << 3) | reg as u8)
}

/// The x86 "group 2" shift/rotate `/digit` selectors the barrel shifter
/// handlers need.
pub const ROL: u8 = 0;
pub const ROR: u8 = 1;
pub const SHL: u8 = 4;
pub const SHR: u8 = 5;
pub const SAR: u8 = 7;

/// Appends `<shift> r32, imm8` (opcode `C1 /digit ib`).
pub fn emit_shift_reg_imm8(buf: &mut CodeBuffer, digit: u8, reg: X86Reg, imm8: u8) -> Result<(), TranslatorError> {
    buf.append_byte(0xC1)?;
    buf.append_byte(0xC0 | (digit << 3) | reg as u8)?;
    buf.append_byte(imm8)
}

/// Appends `MOV r32, [base+disp32]` (opcode `8B /r`, mod=10 base-plus-
/// displacement addressing). Used by the load/store handlers, which
/// always materialize a guest base register into a host scratch
/// register first (`EDX`) rather than addressing guest memory directly.
pub fn emit_mov_reg_from_basedisp32(buf: &mut CodeBuffer, dst: X86Reg, base: X86Reg, disp: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x8B)?;
    buf.append_byte(0x80 | ((dst as u8) << 3) | base as u8)?;
    buf.append_u32(disp)
}

/// Appends `MOV [base+disp32], r32` (opcode `89 /r`, mod=10 form).
pub fn emit_mov_basedisp32_from_reg(buf: &mut CodeBuffer, src: X86Reg, base: X86Reg, disp: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x89)?;
    buf.append_byte(0x80 | ((src as u8) << 3) | base as u8)?;
    buf.append_u32(disp)
}

/// Appends `MOVZX r32, byte [base+disp32]` (opcode `0F B6 /r`): a
/// zero-extended byte load, used by byte-transfer load/store handlers.
pub fn emit_movzx_reg_from_basedisp32_8(buf: &mut CodeBuffer, dst: X86Reg, base: X86Reg, disp: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x0F)?;
    buf.append_byte(0xB6)?;
    buf.append_byte(0x80 | ((dst as u8) << 3) | base as u8)?;
    buf.append_u32(disp)
}

/// Appends `MOV byte [base+disp32], al` (opcode `88 /r`): a byte store.
/// `src` must be a register whose low byte (`AL`/`CL`/`DL`/`BL`) is the
/// intended source; handlers only ever use `Eax`.
pub fn emit_mov_basedisp32_from_reg8(buf: &mut CodeBuffer, src: X86Reg, base: X86Reg, disp: u32) -> Result<(), TranslatorError> {
    buf.append_byte(0x88)?;
    buf.append_byte(0x80 | ((src as u8) << 3) | base as u8)?;
    buf.append_u32(disp)
}

/// Appends a near `CALL rel32` (opcode `E8 rel32`) targeting an absolute
/// host address, used by exit stubs to call into `bbTaken`/`bbNotTaken`.
/// Returns the host address of the `E8` opcode byte itself — the address
/// chaining later overwrites with `JMP rel32` (`E9`).
pub fn emit_call_rel32(buf: &mut CodeBuffer, target: u32) -> Result<u32, TranslatorError> {
    let call_site = buf.cursor();
    buf.append_byte(0xE8)?;
    buf.append_u32(target.wrapping_sub(call_site + 5))?;
    Ok(call_site)
}

/// MOD-R/M byte for `dst, src` reg-reg forms with mod=11 (`Ev,Gv`
/// encoding: `rm` is the destination, `reg` is the source).
fn modrm_reg_reg(src: X86Reg, dst: X86Reg) -> u8 { 0xC0 | ((src as u8) << 3) | dst as u8 }

/// Shorthand for `GuestState::offset_of_reg`, included here so handler
/// modules only need to import `emit`.
pub fn reg_addr(state_base: u32, i: usize) -> u32 {
    state_base + GuestState::offset_of_reg(i) as u32
}

/// Shorthand for the flag-shadow field's absolute address.
pub fn flags_shadow_addr(state_base: u32) -> u32 {
    state_base + GuestState::offset_of_flags_shadow() as u32
}

/// Emits the inverse-condition jump skeleton guarding a non-`AL`
/// instruction: the (possible) `CMC`, then the near `Jcc` opcode with a
/// placeholder `rel32`. Returns the host address of the placeholder so
/// the caller can compute and back-patch the real displacement once the
/// guarded body has been emitted.
pub fn emit_conditional_skip(buf: &mut CodeBuffer, jump: &super::condition::InverseJump) -> Result<u32, TranslatorError> {
    if jump.needs_cmc {
        buf.append_byte(0xF5)?; // CMC
    }
    buf.append_bytes(&jump.near_opcode())?;
    let placeholder = buf.cursor();
    buf.append_u32(0)?; // patched later with (body_end - placeholder_end)
    Ok(placeholder)
}

/// Back-patches a conditional-skip placeholder once the guarded body's
/// end address is known. The displacement is relative to the byte
/// immediately following the 4-byte placeholder.
pub fn patch_conditional_skip(buf: &mut CodeBuffer, placeholder: u32, body_end: u32) {
    let rel = body_end.wrapping_sub(placeholder + 4);
    buf.patch_u32_at(placeholder, rel);
}

/// MOD-R/M byte for `reg, [disp32]` with mod=00, rm=101 (the x86 encoding
/// for "no base, no index, 32-bit absolute displacement follows").
fn modrm_disp32(reg: X86Reg) -> u8 { ((reg as u8) << 3) | 0b101 }

/// Same addressing mode, `reg` field holding a raw `/digit` extension.
fn modrm_digit_disp32(digit: u8, _addr_for_doc: u32) -> u8 { (digit << 3) | 0b101 }

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mov_reg_from_mem_round_trips_through_buffer() {
        let mut buf = CodeBuffer::new(64).unwrap();
        let start = buf.cursor();
        emit_mov_reg_from_mem(&mut buf, X86Reg::Eax, 0x1234_5678).unwrap();
        let bytes = buf.read_bytes_at(start, 6);
        assert_eq!(bytes[0], 0x8B);
        assert_eq!(bytes[1], modrm_disp32(X86Reg::Eax));
        assert_eq!(&bytes[2..6], &0x1234_5678u32.to_le_bytes());
    }

    #[test]
    fn mov_reg_imm32_uses_b8_plus_r() {
        let mut buf = CodeBuffer::new(64).unwrap();
        let start = buf.cursor();
        emit_mov_reg_imm32(&mut buf, X86Reg::Ecx, 42).unwrap();
        let bytes = buf.read_bytes_at(start, 5);
        assert_eq!(bytes[0], 0xB8 + 1);
        assert_eq!(&bytes[1..5], &42u32.to_le_bytes());
    }

    #[test]
    fn conditional_skip_patch_produces_a_forward_relative_displacement() {
        let mut buf = CodeBuffer::new(64).unwrap();
        let jump = super::super::condition::ArmCondition::EQ.inverse_jump_opcode();
        let placeholder = emit_conditional_skip(&mut buf, &jump).unwrap();
        // Pretend a 10-byte body follows.
        for _ in 0..10 { buf.append_byte(0x90).unwrap(); }
        let body_end = buf.cursor();
        patch_conditional_skip(&mut buf, placeholder, body_end);
        let rel_bytes = buf.read_bytes_at(placeholder, 4);
        let rel = u32::from_le_bytes(rel_bytes.try_into().unwrap());
        assert_eq!(rel, 10);
    }

    #[test]
    fn save_and_restore_flags_are_symmetric_opcodes() {
        let mut buf = CodeBuffer::new(64).unwrap();
        let start = buf.cursor();
        emit_save_flags(&mut buf, 0x2000).unwrap();
        let saved = buf.read_bytes_at(start, 7);
        assert_eq!(saved[0], 0x9C);
        assert_eq!(saved[1], 0x8F);

        let start2 = buf.cursor();
        emit_restore_flags(&mut buf, 0x2000).unwrap();
        let restored = buf.read_bytes_at(start2, 7);
        assert_eq!(restored[0], 0xFF);
        assert_eq!(restored[6], 0x9D);
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
