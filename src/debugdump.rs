// License below.
//! A register diff viewer for `--verbose` runs: prints the guest
//! register file and flag shadow after every sealed block, colourising
//! whichever registers changed since the previous dump.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::cell::RefCell;
use std::io;
use std::io::Write;

use crate::translator::state::GuestState;

const DEBUG_REGISTER_NAMES: &[&str] = &[
    "R0:  ", "R1:  ", "R2:  ", "R3:  ", "R4:  ", "R5:  ", "R6:  ", "R7:  ",
    "R8:  ", "R9:  ", "R10: ", "R11: ", "R12: ", "SP:  ", "LR:  ", "PC:  ",
];

/// The colour changed registers are shown in.
pub const DIFF_COLOUR: term::color::Color = term::color::BRIGHT_YELLOW;

/// The colour section headings are shown in.
pub const HEAD_COLOUR: term::color::Color = term::color::BRIGHT_BLUE;

thread_local! {
    static PREV: RefCell<Option<[u32; 16]>> = RefCell::new(None);
}

/// Prints `state`'s registers and flag shadow to stdout, colourising any
/// register that differs from the previous call in this thread (the
/// first call, with nothing to compare against, prints everything
/// uncoloured). Falls back to a plain, uncoloured dump if stdout is not
/// a terminal `term` can drive.
pub fn dump(state: &GuestState) {
    let prev = PREV.with(|p| p.borrow_mut().replace(state.reg));
    let changed = prev.map(|old| diff_mask(&old, &state.reg)).unwrap_or(0);

    match term::stdout() {
        Some(mut t) => { let _ = print_coloured(&mut *t, state, changed); },
        None => print_plain(state, changed),
    }
}

fn diff_mask(old: &[u32; 16], new: &[u32; 16]) -> u16 {
    let mut mask = 0u16;
    for i in 0..16 {
        if old[i] != new[i] { mask |= 1 << i; }
    }
    mask
}

fn print_coloured(terminal: &mut term::StdoutTerminal, state: &GuestState, changed: u16) -> io::Result<()> {
    terminal.fg(HEAD_COLOUR).unwrap_or(());
    write!(terminal, "block sealed\n\t- Register Set")?;
    terminal.reset().unwrap_or(());

    for i in 0..16 {
        if i % 4 == 0 { write!(terminal, "\n\t\t")?; }
        write!(terminal, "{}[", DEBUG_REGISTER_NAMES[i])?;
        if changed & (1 << i) != 0 { terminal.fg(DIFF_COLOUR).unwrap_or(()); }
        write!(terminal, "{:08X}", state.reg[i])?;
        terminal.reset().unwrap_or(());
        write!(terminal, "]\t")?;
    }

    writeln!(terminal, "\n\t\tflagsShadow={:#010X} nextBB={:#010X}\n", state.flags_shadow, state.next_bb)
}

fn print_plain(state: &GuestState, changed: u16) {
    print!("block sealed\n\t- Register Set");
    for i in 0..16 {
        if i % 4 == 0 { print!("\n\t\t"); }
        let marker = if changed & (1 << i) != 0 { "*" } else { " " };
        print!("{}[{:08X}{}]\t", DEBUG_REGISTER_NAMES[i], state.reg[i], marker);
    }
    println!("\n\t\tflagsShadow={:#010X} nextBB={:#010X}\n", state.flags_shadow, state.next_bb);
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
