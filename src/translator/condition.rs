// License below.
//! The 4-bit condition field of an ARM instruction and its x86
//! inverse-jump mapping.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::fmt;
use super::error::TranslatorError;

/// The condition field of an ARM instruction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum ArmCondition {
    #[doc = "Z set. EQual."]                                       EQ = 0b0000,
    #[doc = "Z clear. Not Equal."]                                 NE = 0b0001,
    #[doc = "C set. Carry Set / unsigned higher or same."]         CS = 0b0010,
    #[doc = "C clear. Carry Clear / unsigned lower."]              CC = 0b0011,
    #[doc = "N set. MInus, i.e. negative."]                        MI = 0b0100,
    #[doc = "N clear. PLus, i.e. positive or zero."]               PL = 0b0101,
    #[doc = "V set. Overflow."]                                    VS = 0b0110,
    #[doc = "V clear. No overflow."]                               VC = 0b0111,
    #[doc = "C set and Z clear. Unsigned HIgher."]                 HI = 0b1000,
    #[doc = "C clear or Z set. Unsigned Lower or Same."]           LS = 0b1001,
    #[doc = "N equals V. Greater than or Equal to."]               GE = 0b1010,
    #[doc = "N distinct from V. Less Than."]                       LT = 0b1011,
    #[doc = "Z clear and N equals V. Greater Than."]                GT = 0b1100,
    #[doc = "Z set or N distinct from V. Less than or Equal to."]  LE = 0b1101,
    #[doc = "ALways execute this instruction, i.e. no condition."] AL = 0b1110,
    #[doc = "Reserved/undefined in ARMv4/v5 user code."]           NV = 0b1111,
}

impl ArmCondition {
    /// Decodes the 4-bit condition field out of a raw ARM word.
    ///
    /// # Returns
    /// - `Ok`: the decoded condition.
    /// - `Err(InvalidCondition)`: the field was the reserved `NV` encoding.
    pub fn decode(raw: u32) -> Result<ArmCondition, TranslatorError> {
        let c = ((raw >> 28) & 0b1111) as u8;
        if c == ArmCondition::NV as u8 {
            return Err(TranslatorError::InvalidCondition(raw));
        }
        Ok(unsafe { std::mem::transmute(c) })
    }

    /// Checks whether this condition always executes, i.e. needs no
    /// conditional prelude in the emitted code.
    pub fn is_always(self) -> bool { self == ArmCondition::AL }

    /// The x86 opcode bytes of the *inverse* conditional jump used as the
    /// prelude skip-over for this ARM condition.
    ///
    /// Some conditions need a `CMC` (complement carry) ahead of the jump
    /// because x86 has no direct "above" test sharing ARM's HI/LS
    /// carry+zero combination; those return the two-byte `CMC` prefix
    /// followed by the jump opcode.
    pub fn inverse_jump_opcode(self) -> InverseJump {
        match self {
            ArmCondition::EQ => InverseJump::simple(0x75), // JNE
            ArmCondition::NE => InverseJump::simple(0x74), // JE
            ArmCondition::CS => InverseJump::simple(0x73), // JNC
            ArmCondition::CC => InverseJump::simple(0x72), // JC
            ArmCondition::HI => InverseJump::with_cmc(0x76), // CMC; JNA
            ArmCondition::LS => InverseJump::with_cmc(0x77), // CMC; JNBE
            ArmCondition::GE => InverseJump::simple(0x7C), // JL
            ArmCondition::LT => InverseJump::simple(0x7D), // JNL (JGE)
            ArmCondition::GT => InverseJump::simple(0x7E), // JNG (JLE)
            ArmCondition::LE => InverseJump::simple(0x7F), // JG
            ArmCondition::MI => InverseJump::simple(0x79), // JNS
            ArmCondition::PL => InverseJump::simple(0x78), // JS
            ArmCondition::VS => InverseJump::simple(0x71), // JNO
            ArmCondition::VC => InverseJump::simple(0x70), // JO
            ArmCondition::AL => unreachable!("AL needs no conditional prelude; callers must check is_always() first"),
            ArmCondition::NV => unreachable!("NV is rejected at decode time"),
        }
    }
}

/// The bytes of an inverse-conditional jump skeleton.
///
/// The displacement is always a `u32` near-jump operand (`0F 8x rel32`
/// for the two-byte-opcode near form), emitted as a placeholder and
/// back-patched once the guarded instruction's body length is known.
pub struct InverseJump {
    /// `true` if a `CMC` (0xF5) must precede the jump (HI/LS only).
    pub needs_cmc: bool,
    /// The short-form `Jcc rel8` opcode byte; used to derive the near
    /// `0F 8x` opcode (`near = short + 0x10`) for the emitter, which
    /// always emits the near (rel32) form so the placeholder width is
    /// fixed regardless of body length.
    pub short_opcode: u8,
}

impl InverseJump {
    fn simple(short_opcode: u8) -> InverseJump { InverseJump { needs_cmc: false, short_opcode } }
    fn with_cmc(short_opcode: u8) -> InverseJump { InverseJump { needs_cmc: true, short_opcode } }

    /// The near (`0F 8x rel32`) opcode pair for this jump.
    pub fn near_opcode(&self) -> [u8; 2] { [0x0F, self.short_opcode + 0x10] }
}

impl fmt::Display for ArmCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            ArmCondition::EQ => "eq", ArmCondition::NE => "ne",
            ArmCondition::CS => "cs", ArmCondition::CC => "cc",
            ArmCondition::MI => "mi", ArmCondition::PL => "pl",
            ArmCondition::VS => "vs", ArmCondition::VC => "vc",
            ArmCondition::HI => "hi", ArmCondition::LS => "ls",
            ArmCondition::GE => "ge", ArmCondition::LT => "lt",
            ArmCondition::GT => "gt", ArmCondition::LE => "le",
            ArmCondition::AL => "", ArmCondition::NV => "nv",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_all_non_reserved_conditions() {
        for c in 0..15u32 {
            let raw = c << 28;
            assert!(ArmCondition::decode(raw).is_ok());
        }
    }

    #[test]
    fn rejects_nv() {
        let raw = 0b1111u32 << 28;
        match ArmCondition::decode(raw) {
            Err(TranslatorError::InvalidCondition(_)) => {},
            _ => panic!("expected InvalidCondition"),
        }
    }

    #[test]
    fn hi_and_ls_need_cmc() {
        assert!(ArmCondition::HI.inverse_jump_opcode().needs_cmc);
        assert!(ArmCondition::LS.inverse_jump_opcode().needs_cmc);
        assert!(!ArmCondition::EQ.inverse_jump_opcode().needs_cmc);
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
