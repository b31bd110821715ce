// License below.
//! The guest CPU's register file and the bookkeeping the translator's
//! generated code and runtime callouts share.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::fmt;

/// Guest register index of the stack pointer.
pub const SP: usize = 13;

/// Guest register index of the link register.
pub const LR: usize = 14;

/// Guest register index of the program counter.
pub const PC: usize = 15;

/// Sentinel `nextBB` value the exit stubs never write and `bbTaken`
/// checks for to mean "the guest program has run off the end".
pub const NEXT_BB_HALT: u32 = 0;

/// The ARM guest's register file, flag shadow, and the bookkeeping the
/// exit stubs and callouts need to talk to each other.
///
/// Instances of this type are referenced by generated x86 code through
/// absolute displacements baked in at emission time (`addr_of_reg`,
/// `addr_of_flags_shadow`, ...). A `GuestState` must therefore live at a
/// stable heap address for the whole run; the `Translator` that owns one
/// keeps it in a `Box` and never replaces or moves the box's contents
/// out, only ever mutating through `&mut`/raw pointers obtained once.
#[repr(C)]
pub struct GuestState {
    /// `reg[0..=12]` are general purpose, `reg[13]` is SP, `reg[14]` is
    /// LR, `reg[15]` is PC. Handlers materialize `reg[15]` on demand; it
    /// is never updated incrementally.
    pub reg: [u32; 16],

    /// Mirrors the x86 EFLAGS layout; authoritative immediately after
    /// any translated instruction with `S=1`.
    pub flags_shadow: u32,

    /// Guest address of the next block to run. Written by an exit stub
    /// just before it calls a callout; read by the callout.
    pub next_bb: u32,

    /// Host address of the `CALL` operand cell for the most recently
    /// emitted "taken" exit stub, or zero if that stub is not eligible
    /// for chaining.
    pub taken_src: u32,

    /// Host address of the `CALL` operand cell for the most recently
    /// emitted "not taken" exit stub, or zero if ineligible for chaining.
    pub untaken_src: u32,
}

impl GuestState {
    /// Creates a fresh guest state with all registers zeroed.
    ///
    /// The caller (the loader, via `Translator::new`) is responsible for
    /// seeding `reg[0]`, `reg[SP]`, and `reg[PC]` from the guest image.
    pub fn new() -> GuestState {
        GuestState {
            reg: [0; 16],
            flags_shadow: 0,
            next_bb: NEXT_BB_HALT,
            taken_src: 0,
            untaken_src: 0,
        }
    }

    /// Byte offset of `reg[i]` within this struct, for absolute-address
    /// emission into generated code.
    pub fn offset_of_reg(i: usize) -> usize {
        debug_assert!(i < 16);
        std::mem::offset_of!(GuestState, reg) + i * 4
    }

    /// Byte offset of `flags_shadow` within this struct.
    pub fn offset_of_flags_shadow() -> usize { std::mem::offset_of!(GuestState, flags_shadow) }

    /// Byte offset of `next_bb` within this struct.
    pub fn offset_of_next_bb() -> usize { std::mem::offset_of!(GuestState, next_bb) }

    /// Byte offset of `taken_src` within this struct.
    pub fn offset_of_taken_src() -> usize { std::mem::offset_of!(GuestState, taken_src) }

    /// Byte offset of `untaken_src` within this struct.
    pub fn offset_of_untaken_src() -> usize { std::mem::offset_of!(GuestState, untaken_src) }
}

impl fmt::Display for GuestState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for i in 0..16 {
            write!(f, "R{:<2}={:#010X} ", i, self.reg[i])?;
            if i % 4 == 3 { writeln!(f)?; }
        }
        write!(f, "flagsShadow={:#010X} nextBB={:#010X}", self.flags_shadow, self.next_bb)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_state_is_zeroed_and_halted() {
        let s = GuestState::new();
        assert_eq!(s.reg, [0u32; 16]);
        assert_eq!(s.next_bb, NEXT_BB_HALT);
        assert_eq!(s.taken_src, 0);
        assert_eq!(s.untaken_src, 0);
    }

    #[test]
    fn reg_offsets_are_four_apart_and_in_order() {
        for i in 1..16 {
            assert_eq!(GuestState::offset_of_reg(i) - GuestState::offset_of_reg(i - 1), 4);
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
