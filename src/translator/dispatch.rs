// License below.
//! The `bbTaken`/`bbNotTaken` callouts every exit stub's `CALL`
//! targets, and the chaining patch that later rewrites that `CALL` into
//! a direct `JMP` once both the source and destination blocks are known.
//!
//! These are genuine no-argument, C-ABI functions: generated code can
//! only `CALL` a bare address, so there is no way to pass the owning
//! `Translator` in as a parameter. They recover it through a raw static
//! pointer set once by [`super::Translator::run`], which is the one
//! deliberate unsafe global this translator carries.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![allow(static_mut_refs)]
#![warn(missing_docs)]

use super::Translator;

/// The running translator, set once before any generated code executes.
///
/// # Safety
/// Only ever written once, before entry, and only ever read from the
/// single host thread that is executing translated guest code.
pub static mut CURRENT_TRANSLATOR: *mut Translator = std::ptr::null_mut();

/// Called when an exit stub's guarded instruction was taken (an
/// unconditional branch, or any conditional instruction whose condition
/// held).
pub unsafe extern "C" fn bb_taken() {
    let translator = &mut *CURRENT_TRANSLATOR;
    translator.handle_exit(true);
}

/// Called when a conditional branch's (or conditional PC-write's)
/// condition did not hold, landing on the fallthrough continuation.
pub unsafe extern "C" fn bb_not_taken() {
    let translator = &mut *CURRENT_TRANSLATOR;
    translator.handle_exit(false);
}

/// The host address `emit_call_rel32`/chaining need for `bb_taken`.
pub fn bb_taken_addr() -> u32 { (bb_taken as unsafe extern "C" fn()) as usize as u32 }

/// The host address `emit_call_rel32`/chaining need for `bb_not_taken`.
pub fn bb_not_taken_addr() -> u32 { (bb_not_taken as unsafe extern "C" fn()) as usize as u32 }


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
