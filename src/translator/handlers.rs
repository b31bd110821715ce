// License below.
//! Per-family instruction handlers: the code that actually emits a
//! translated instruction's x86 body once the decoder and the block
//! builder's conditional prelude have done their part.
//!
//! Every data-processing opcode funnels through [`emit_data_processing`],
//! which always routes the second operand through `EAX` and the first
//! through `EDX`/`EAX` in a fixed order, rather than special-casing each
//! of the sixteen opcodes' operand order individually. Reversed-operand
//! forms (`RSB`, `RSC`) and comparison-only forms (`TST`/`TEQ`/`CMP`/`CMN`)
//! fall out of the same dispatch as plain variants of the scheme.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use super::codebuf::CodeBuffer;
use super::decode::{Branch, DpImm, DpReg, LsImm, LsMult, LsReg, ShiftType};
use super::emit::{self, X86Reg, ADD, ADC, AND, OR, SBB, SUB, XOR};
use super::error::TranslatorError;
use super::state::{LR, PC};

/// What a translated instruction leaves for the block builder to turn
/// into an exit stub, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    /// This instruction does not end the block.
    None,
    /// This instruction is an unconditional transfer of control to a
    /// guest address known at translation time (a `B`/`BL`). Chaining
    /// is always eligible for these.
    Branch(u32),
    /// This instruction wrote `PC` with a value only known at run time
    /// (`MOV`/`ADD`/... with `Rd==15`, `LDR` with `Rd==15`, or an `LDM`
    /// that loaded `r15`). The new value is already sitting in
    /// `reg[15]`; chaining is never eligible, since the target can
    /// legitimately differ between two executions of the same block.
    PcWritten,
}

/// ARM opcode field values (bits 24:21 of a data-processing instruction).
const OP_AND: u8 = 0;
const OP_EOR: u8 = 1;
const OP_SUB: u8 = 2;
const OP_RSB: u8 = 3;
const OP_ADD: u8 = 4;
const OP_ADC: u8 = 5;
const OP_SBC: u8 = 6;
const OP_RSC: u8 = 7;
const OP_TST: u8 = 8;
const OP_TEQ: u8 = 9;
const OP_CMP: u8 = 10;
const OP_CMN: u8 = 11;
const OP_ORR: u8 = 12;
const OP_MOV: u8 = 13;
const OP_BIC: u8 = 14;
const OP_MVN: u8 = 15;

/// Materializes `reg[15]` to `arm_addr + 8` (the ARM "PC reads as the
/// address of the current instruction plus 8" rule) immediately before
/// an instruction that reads it as a source operand. Instructions that
/// only ever *write* `PC` (`Rd==15`) never need this.
fn materialize_pc_if_read(buf: &mut CodeBuffer, state_base: u32, arm_addr: u32, reads_pc: bool) -> Result<(), TranslatorError> {
    if reads_pc {
        emit::emit_mov_mem_imm32(buf, emit::reg_addr(state_base, PC), arm_addr.wrapping_add(8))?;
    }
    Ok(())
}

fn shift_digit(shift_type: ShiftType) -> u8 {
    match shift_type {
        ShiftType::LSL => emit::SHL,
        ShiftType::LSR => emit::SHR,
        ShiftType::ASR => emit::SAR,
        ShiftType::ROR => emit::ROR,
    }
}

/// Loads a data-processing register-form operand 2 into `EAX`, applying
/// its immediate-amount barrel shift.
///
/// Register-specified shift amounts (`shift_by_reg`) and `RRX` (`ROR`
/// with a zero immediate amount) are not implemented; both are reported
/// as unsupported rather than silently mistranslated.
fn emit_op2_reg(buf: &mut CodeBuffer, state_base: u32, op: &DpReg, raw: u32, arm_addr: u32) -> Result<(), TranslatorError> {
    if op.shift_by_reg {
        return Err(TranslatorError::UnsupportedInstruction(raw, arm_addr));
    }
    emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, emit::reg_addr(state_base, op.rm))?;
    if op.shift_amt != 0 {
        emit::emit_shift_reg_imm8(buf, shift_digit(op.shift_type), X86Reg::Eax, op.shift_amt as u8)?;
    } else if op.shift_type == ShiftType::ROR {
        return Err(TranslatorError::UnsupportedInstruction(raw, arm_addr)); // RRX
    }
    Ok(())
}

/// Loads a data-processing immediate-form operand 2 into `EAX`: the
/// 8-bit immediate, rotated right by the decoder's pre-doubled amount.
fn emit_op2_imm(buf: &mut CodeBuffer, op: &DpImm) -> Result<(), TranslatorError> {
    emit::emit_mov_reg_imm32(buf, X86Reg::Eax, op.imm8)?;
    if op.rotate != 0 {
        emit::emit_shift_reg_imm8(buf, emit::ROR, X86Reg::Eax, op.rotate as u8)?;
    }
    Ok(())
}

/// Emits one data-processing instruction body given `EAX` already holding
/// operand 2 (possibly shifted/rotated).
///
/// `S=1` wraps the body in the flag-shadow restore/save pair so the
/// instruction both consumes and produces carry-dependent condition
/// codes through `GuestState::flags_shadow`; `ADC`/`SBC`/`RSC` only
/// behave correctly when the guest code that uses them also sets `S` on
/// the instruction supplying the carry-in, same as the host it was
/// translated from.
fn emit_alu_body(buf: &mut CodeBuffer, state_base: u32, opcode: u8, rn: usize, rd: usize, s: bool) -> Result<(), TranslatorError> {
    if s {
        emit::emit_restore_flags(buf, emit::flags_shadow_addr(state_base))?;
    }

    let rn_addr = emit::reg_addr(state_base, rn);
    let rd_addr = emit::reg_addr(state_base, rd);
    let mut writes_rd = true;

    match opcode {
        OP_AND => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, AND, X86Reg::Eax, X86Reg::Edx)?; }
        OP_EOR => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, XOR, X86Reg::Eax, X86Reg::Edx)?; }
        OP_SUB => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, SUB, X86Reg::Eax, X86Reg::Edx)?; }
        OP_RSB => {
            load_rn_into_edx_eax(buf, state_base, rn_addr)?; // EDX=Op2, EAX=Rn
            emit::emit_group1_reg_reg(buf, SUB, X86Reg::Edx, X86Reg::Eax)?; // EDX -= EAX -> Op2-Rn
            emit::emit_mov_reg_reg(buf, X86Reg::Eax, X86Reg::Edx)?;
        }
        OP_ADD => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, ADD, X86Reg::Eax, X86Reg::Edx)?; }
        OP_ADC => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, ADC, X86Reg::Eax, X86Reg::Edx)?; }
        OP_SBC => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, SBB, X86Reg::Eax, X86Reg::Edx)?; }
        OP_RSC => {
            load_rn_into_edx_eax(buf, state_base, rn_addr)?;
            emit::emit_group1_reg_reg(buf, SBB, X86Reg::Edx, X86Reg::Eax)?;
            emit::emit_mov_reg_reg(buf, X86Reg::Eax, X86Reg::Edx)?;
        }
        OP_TST => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, AND, X86Reg::Eax, X86Reg::Edx)?; writes_rd = false; }
        OP_TEQ => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, XOR, X86Reg::Eax, X86Reg::Edx)?; writes_rd = false; }
        OP_CMP => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, SUB, X86Reg::Eax, X86Reg::Edx)?; writes_rd = false; }
        OP_CMN => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, ADD, X86Reg::Eax, X86Reg::Edx)?; writes_rd = false; }
        OP_ORR => { load_rn_into_edx_eax(buf, state_base, rn_addr)?; emit::emit_group1_reg_reg(buf, OR, X86Reg::Eax, X86Reg::Edx)?; }
        OP_MOV => {} // EAX already holds Op2.
        OP_BIC => {
            emit::emit_mov_reg_reg(buf, X86Reg::Edx, X86Reg::Eax)?; // EDX=Op2
            emit::emit_not_reg(buf, X86Reg::Edx)?;
            emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, rn_addr)?; // EAX=Rn
            emit::emit_group1_reg_reg(buf, AND, X86Reg::Eax, X86Reg::Edx)?;
        }
        OP_MVN => { emit::emit_not_reg(buf, X86Reg::Eax)?; }
        _ => unreachable!("ARM data-processing opcode field is 4 bits"),
    }

    if writes_rd {
        emit::emit_mov_mem_from_reg(buf, X86Reg::Eax, rd_addr)?;
    }
    if s {
        emit::emit_save_flags(buf, emit::flags_shadow_addr(state_base))?;
    }
    Ok(())
}

/// `EDX := Op2 (current EAX); EAX := reg[rn]` — the load order every
/// non-`MOV`/`MVN` opcode above shares.
fn load_rn_into_edx_eax(buf: &mut CodeBuffer, _state_base: u32, rn_addr: u32) -> Result<(), TranslatorError> {
    emit::emit_mov_reg_reg(buf, X86Reg::Edx, X86Reg::Eax)?;
    emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, rn_addr)
}

/// Translates a data-processing register-form instruction.
pub fn handle_dp_reg(buf: &mut CodeBuffer, state_base: u32, op: &DpReg, raw: u32, arm_addr: u32) -> Result<BlockEnd, TranslatorError> {
    let reads_pc = op.rm == PC || (op.rn == PC && op.opcode != OP_MOV && op.opcode != OP_MVN);
    materialize_pc_if_read(buf, state_base, arm_addr, reads_pc)?;
    emit_op2_reg(buf, state_base, op, raw, arm_addr)?;
    emit_alu_body(buf, state_base, op.opcode, op.rn, op.rd, op.s)?;
    Ok(writes_pc_end(op.rd, op.opcode))
}

/// Translates a data-processing immediate-form instruction.
pub fn handle_dp_imm(buf: &mut CodeBuffer, state_base: u32, op: &DpImm, arm_addr: u32) -> Result<BlockEnd, TranslatorError> {
    let reads_pc = op.rn == PC && op.opcode != OP_MOV && op.opcode != OP_MVN;
    materialize_pc_if_read(buf, state_base, arm_addr, reads_pc)?;
    emit_op2_imm(buf, op)?;
    emit_alu_body(buf, state_base, op.opcode, op.rn, op.rd, op.s)?;
    Ok(writes_pc_end(op.rd, op.opcode))
}

fn writes_pc_end(rd: usize, opcode: u8) -> BlockEnd {
    let writes_rd = !matches!(opcode, OP_TST | OP_TEQ | OP_CMP | OP_CMN);
    if writes_rd && rd == PC { BlockEnd::PcWritten } else { BlockEnd::None }
}

/// Translates a load/store-immediate-offset instruction.
pub fn handle_ls_imm(buf: &mut CodeBuffer, state_base: u32, op: &LsImm, arm_addr: u32) -> Result<BlockEnd, TranslatorError> {
    materialize_pc_if_read(buf, state_base, arm_addr, op.rn == PC)?;
    emit::emit_mov_reg_from_mem(buf, X86Reg::Edx, emit::reg_addr(state_base, op.rn))?; // EDX=base

    let disp = signed_imm12(op.imm12, op.u);
    let access_disp = if op.p { disp } else { 0 };

    if op.l {
        if op.b {
            emit::emit_movzx_reg_from_basedisp32_8(buf, X86Reg::Eax, X86Reg::Edx, access_disp)?;
        } else {
            emit::emit_mov_reg_from_basedisp32(buf, X86Reg::Eax, X86Reg::Edx, access_disp)?;
        }
        emit::emit_mov_mem_from_reg(buf, X86Reg::Eax, emit::reg_addr(state_base, op.rd))?;
    } else {
        emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, emit::reg_addr(state_base, op.rd))?;
        if op.b {
            emit::emit_mov_basedisp32_from_reg8(buf, X86Reg::Eax, X86Reg::Edx, access_disp)?;
        } else {
            emit::emit_mov_basedisp32_from_reg(buf, X86Reg::Eax, X86Reg::Edx, access_disp)?;
        }
    }

    if !op.p || op.w {
        emit::emit_group1_mem_imm32(buf, ADD, emit::reg_addr(state_base, op.rn), disp)?;
    }

    Ok(if op.l && op.rd == PC { BlockEnd::PcWritten } else { BlockEnd::None })
}

/// Translates a load/store-register-offset instruction.
pub fn handle_ls_reg(buf: &mut CodeBuffer, state_base: u32, op: &LsReg, raw: u32, arm_addr: u32) -> Result<BlockEnd, TranslatorError> {
    materialize_pc_if_read(buf, state_base, arm_addr, op.rn == PC)?;
    emit::emit_mov_reg_from_mem(buf, X86Reg::Edx, emit::reg_addr(state_base, op.rn))?; // EDX=base

    emit::emit_mov_reg_from_mem(buf, X86Reg::Ecx, emit::reg_addr(state_base, op.rm))?;
    if op.shift_amt != 0 {
        emit::emit_shift_reg_imm8(buf, shift_digit(op.shift_type), X86Reg::Ecx, op.shift_amt as u8)?;
    } else if op.shift_type == ShiftType::ROR {
        return Err(TranslatorError::UnsupportedInstruction(raw, arm_addr)); // RRX
    }
    if !op.u {
        emit::emit_neg_reg(buf, X86Reg::Ecx)?;
    }

    if op.p {
        emit::emit_group1_reg_reg(buf, ADD, X86Reg::Edx, X86Reg::Ecx)?; // EDX = base + offset
    }

    if op.l {
        if op.b {
            emit::emit_movzx_reg_from_basedisp32_8(buf, X86Reg::Eax, X86Reg::Edx, 0)?;
        } else {
            emit::emit_mov_reg_from_basedisp32(buf, X86Reg::Eax, X86Reg::Edx, 0)?;
        }
        emit::emit_mov_mem_from_reg(buf, X86Reg::Eax, emit::reg_addr(state_base, op.rd))?;
    } else {
        emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, emit::reg_addr(state_base, op.rd))?;
        if op.b {
            emit::emit_mov_basedisp32_from_reg8(buf, X86Reg::Eax, X86Reg::Edx, 0)?;
        } else {
            emit::emit_mov_basedisp32_from_reg(buf, X86Reg::Eax, X86Reg::Edx, 0)?;
        }
    }

    if !op.p || op.w {
        if !op.p {
            emit::emit_group1_reg_reg(buf, ADD, X86Reg::Edx, X86Reg::Ecx)?;
        }
        emit::emit_mov_mem_from_reg(buf, X86Reg::Edx, emit::reg_addr(state_base, op.rn))?;
    }

    Ok(if op.l && op.rd == PC { BlockEnd::PcWritten } else { BlockEnd::None })
}

/// Translates a load/store-multiple instruction.
///
/// `disp` runs ascending or descending depending on `U`, and is bumped
/// before a transfer when `P=1` (pre-increment: `IB`/`DB` addressing) or
/// after when `P=0` (post-increment: `IA`/`DA`), exactly tracking the
/// ARM ARM's four addressing modes without naming them individually.
/// `S` (user-bank register transfer) is not modeled: this translator
/// only ever runs guest code in one register bank.
pub fn handle_ls_mult(buf: &mut CodeBuffer, state_base: u32, op: &LsMult) -> Result<BlockEnd, TranslatorError> {
    emit::emit_mov_reg_from_mem(buf, X86Reg::Edx, emit::reg_addr(state_base, op.rn))?; // EDX=base

    let order: Vec<usize> = if op.u { (0..16).collect() } else { (0..16).rev().collect() };
    let mut disp: i32 = 0;
    let mut end_block = false;

    for r in order {
        if op.reg_list_mask16 & (1 << r) == 0 { continue; }
        if op.p { disp += 4; }
        let signed_disp = if op.u { disp } else { -disp };
        if op.l {
            emit::emit_mov_reg_from_basedisp32(buf, X86Reg::Eax, X86Reg::Edx, signed_disp as u32)?;
            emit::emit_mov_mem_from_reg(buf, X86Reg::Eax, emit::reg_addr(state_base, r))?;
            if r == PC { end_block = true; }
        } else {
            emit::emit_mov_reg_from_mem(buf, X86Reg::Eax, emit::reg_addr(state_base, r))?;
            emit::emit_mov_basedisp32_from_reg(buf, X86Reg::Eax, X86Reg::Edx, signed_disp as u32)?;
        }
        if !op.p { disp += 4; }
    }

    if op.w {
        let total = if op.u { disp } else { -disp };
        emit::emit_group1_mem_imm32(buf, ADD, emit::reg_addr(state_base, op.rn), total as u32)?;
    }

    Ok(if end_block { BlockEnd::PcWritten } else { BlockEnd::None })
}

/// Translates a branch (`B`/`BL`) instruction. The target is a
/// translation-time constant, so unlike the `PcWritten` forms above this
/// is always chainable.
pub fn handle_branch(buf: &mut CodeBuffer, state_base: u32, op: &Branch, arm_addr: u32) -> Result<BlockEnd, TranslatorError> {
    let target = arm_addr.wrapping_add(8).wrapping_add(op.offset24 as u32);
    if op.l {
        emit::emit_mov_mem_imm32(buf, emit::reg_addr(state_base, LR), arm_addr.wrapping_add(4))?;
    }
    Ok(BlockEnd::Branch(target))
}

/// `SWI` and any coprocessor/unrecognized encoding: emits nothing and
/// fails immediately, leaving no partial instruction body behind.
pub fn handle_unsupported(raw: u32, arm_addr: u32) -> Result<BlockEnd, TranslatorError> {
    Err(TranslatorError::UnsupportedInstruction(raw, arm_addr))
}

fn signed_imm12(imm12: u32, u: bool) -> u32 {
    if u { imm12 } else { (imm12 as i32).wrapping_neg() as u32 }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::translator::decode::{decode, Family};

    fn fresh_buf() -> CodeBuffer { CodeBuffer::new(4096).unwrap() }

    #[test]
    fn mov_immediate_writes_rd_without_touching_rn() {
        // MOV R1, #5
        let raw = 0b1110_00_1_1101_0_0000_0001_0000_00000101u32;
        let d = decode(raw, 0x8000).unwrap();
        let mut buf = fresh_buf();
        match d.family {
            Family::DpImm(dp) => {
                let end = handle_dp_imm(&mut buf, 0x9000, &dp, 0x8000).unwrap();
                assert_eq!(end, BlockEnd::None);
            }
            _ => panic!("expected DpImm"),
        }
    }

    #[test]
    fn mov_to_pc_is_reported_as_pc_written() {
        // MOV R15, R0 (cond=AL, I=0, opcode=MOV, S=0, Rd=15, Rm=0).
        let raw = 0b1110_00_0_1101_0_0000_1111_00000000_0000u32;
        let d = decode(raw, 0x8000).unwrap();
        let mut buf = fresh_buf();
        match d.family {
            Family::DpReg(dp) => {
                let end = handle_dp_reg(&mut buf, 0x9000, &dp, raw, 0x8000).unwrap();
                assert_eq!(end, BlockEnd::PcWritten);
            }
            _ => panic!("expected DpReg"),
        }
    }

    #[test]
    fn register_specified_shift_is_unsupported() {
        // ADD R0, R1, R2, LSL R3 (shift_by_reg=1).
        let raw = 0b1110_00_0_0100_0_0001_0000_0011_0_00_1_0010u32;
        let d = decode(raw, 0x8000).unwrap();
        let mut buf = fresh_buf();
        match d.family {
            Family::DpReg(dp) => {
                assert!(dp.shift_by_reg);
                let err = handle_dp_reg(&mut buf, 0x9000, &dp, raw, 0x8000).unwrap_err();
                assert!(matches!(err, TranslatorError::UnsupportedInstruction(_, _)));
            }
            _ => panic!("expected DpReg"),
        }
    }

    #[test]
    fn branch_computes_pc_relative_target_with_plus_eight_bias() {
        let raw = 0b1110_101_0_111111111111111111111110u32; // B #-2 words -> self
        let d = decode(raw, 0x8000).unwrap();
        match d.family {
            Family::Branch(b) => {
                match handle_branch(&mut fresh_buf(), 0x9000, &b, 0x8000).unwrap() {
                    BlockEnd::Branch(target) => assert_eq!(target, 0x8000),
                    other => panic!("expected Branch end, got {:?}", other),
                }
            }
            _ => panic!("expected Branch"),
        }
    }

    #[test]
    fn swi_emits_nothing_before_failing() {
        let mut buf = fresh_buf();
        let start = buf.cursor();
        let err = handle_unsupported(0xEF000000, 0x8000).unwrap_err();
        assert!(matches!(err, TranslatorError::UnsupportedInstruction(_, _)));
        assert_eq!(buf.cursor(), start);
    }

    #[test]
    fn ldm_loading_pc_ends_the_block() {
        // LDMIA R0!, {R1, PC}: P=0,U=1,W=1,L=1, reglist = bit1 | bit15.
        let op = LsMult { rn: 0, reg_list_mask16: (1 << 1) | (1 << 15), p: false, u: true, s: false, w: true, l: true };
        let end = handle_ls_mult(&mut fresh_buf(), 0x9000, &op).unwrap();
        assert_eq!(end, BlockEnd::PcWritten);
    }

    #[test]
    fn stmdb_writeback_stores_registers_at_descending_addresses() {
        // STMDB SP!, {R4-R6, LR}: P=1,U=0,W=1,L=0, reglist = bits 4,5,6,14.
        let mask = (1 << 4) | (1 << 5) | (1 << 6) | (1 << 14);
        let op = LsMult { rn: 13, reg_list_mask16: mask, p: true, u: false, s: false, w: true, l: false };
        let mut buf = fresh_buf();
        let end = handle_ls_mult(&mut buf, 0x9000, &op).unwrap();
        assert_eq!(end, BlockEnd::None);

        // Last emitted instruction is the writeback: ADD [reg[13]], total.
        // total is -16 as u32 (SP -= 16), which is what §8/S4 requires.
        let tail = buf.read_bytes_at(buf.cursor() - 10, 10);
        assert_eq!(tail[0], 0x81); // group-1 Ev,imm32
        let total = u32::from_le_bytes(tail[6..10].try_into().unwrap());
        assert_eq!(total, (-16i32) as u32);
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
