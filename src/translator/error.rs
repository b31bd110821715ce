// License below.
//! Implements the error taxonomy of the translator.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::error;
use std::fmt;
use std::io;

/// Errors produced while loading a guest image or translating guest code.
#[derive(Debug)]
pub enum TranslatorError {
    /// The decoder reached an ARM encoding no handler implements.
    ///
    /// Carries the raw 32-bit word and its guest address for diagnostics.
    UnsupportedInstruction(u32, u32),

    /// The condition field decoded to the reserved `NV` encoding.
    InvalidCondition(u32),

    /// Emitting the next instruction would overrun the code buffer.
    ExhaustedCodeBuffer,

    /// The chaining patch site did not contain the expected `CALL rel32` bytes.
    BadPatchSite(u32),

    /// The ELF image could not be parsed or mapped.
    Loader(LoaderError),
}

impl error::Error for TranslatorError {}

impl fmt::Display for TranslatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TranslatorError::UnsupportedInstruction(w, a) =>
                write!(f, "unsupported ARM instruction {:#010X} at guest address {:#010X}", w, a),
            TranslatorError::InvalidCondition(w) =>
                write!(f, "reserved NV condition in instruction {:#010X}", w),
            TranslatorError::ExhaustedCodeBuffer =>
                write!(f, "code buffer exhausted"),
            TranslatorError::BadPatchSite(a) =>
                write!(f, "chaining patch site at {:#010X} did not contain a CALL rel32", a),
            TranslatorError::Loader(ref e) =>
                write!(f, "failed loading guest image: {}", e),
        }
    }
}

impl From<LoaderError> for TranslatorError {
    fn from(e: LoaderError) -> TranslatorError { TranslatorError::Loader(e) }
}

/// Errors raised by the ELF loader (an external collaborator; see `loader`).
#[derive(Debug)]
pub enum LoaderError {
    /// Could not read the file at all.
    Io(io::Error),

    /// The file does not start with the ELF magic number.
    NotElf,

    /// The ELF header does not describe a 32-bit little-endian ARM executable.
    UnsupportedTarget,

    /// A program header claims a segment outside the mapped guest address space.
    SegmentOutOfRange(u32),
}

impl error::Error for LoaderError {}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoaderError::Io(ref e)       => write!(f, "I/O error: {}", e),
            LoaderError::NotElf          => write!(f, "missing ELF magic number"),
            LoaderError::UnsupportedTarget => write!(f, "not a 32-bit little-endian ARM executable"),
            LoaderError::SegmentOutOfRange(a) => write!(f, "PT_LOAD segment at {:#010X} exceeds the guest address space", a),
        }
    }
}

impl From<io::Error> for LoaderError {
    fn from(e: io::Error) -> LoaderError { LoaderError::Io(e) }
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
