// License below.
//! A console/file logger bridging `log`'s facade to this program's own
//! formatting, with optional ANSI colouring by level.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::thread;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Logs to stdout, and optionally also to a file, formatting each
/// record with its thread, level, and source location.
pub struct ConsoleFileLogger {
    file: Option<Mutex<RefCell<File>>>,
    verbose: bool,
    colour: bool,
}

impl Log for ConsoleFileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let min_level = if self.verbose { Level::Trace } else { Level::Info };
        metadata.level() <= min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let cur = thread::current();
        let tid = cur.name().unwrap_or("<?>");
        let loc = format!(
            "[{}:{} - {}]",
            record.file().unwrap_or("<unknown>"),
            record.line().unwrap_or(0),
            record.module_path().unwrap_or("<unknown>"),
        );
        let fmt = format!("{}", record.args()).replace('\n', "\n\t\t   ");
        let msg = format!("[TID={}]\t{}\t{}\n\t\t-- {}\n", tid, record.level(), loc, fmt);

        if let Some(f) = self.file.as_ref() {
            let guard = f.lock().unwrap();
            writeln!(*guard.borrow_mut(), "{}", msg).unwrap();
        }

        if !self.colour {
            println!("{}", msg);
        } else {
            println!(
                "\x1B[0m\x1B[2m[TID={}]\t{}{}\x1B[0m\x1B[2m\t{}\x1B[1m\n\t\t-- {}\x1B[0m\n",
                tid,
                match record.level() {
                    Level::Error => "\x1B[31m\x1B[1m", // Bold, red.
                    Level::Warn  => "\x1B[33m\x1B[1m", // Bold, yellow.
                    Level::Info  => "\x1B[32m\x1B[1m", // Bold, green.
                    _            => "\x1B[34m\x1B[1m", // Bold, blue.
                },
                record.level(), loc, fmt
            );
        }
    }

    fn flush(&self) {
        if let Some(f) = self.file.as_ref() {
            let guard = f.lock().unwrap();
            guard.borrow_mut().flush().unwrap_or(());
        }
    }
}

/// Installs a [`ConsoleFileLogger`] as the global logger. `file`, if
/// given, also receives every record that passes the level filter;
/// `verbose` lowers that filter from `Info` to `Trace`.
pub fn init_with(file: Option<&Path>, verbose: bool, colour: bool) -> Result<(), SetLoggerError> {
    let logger = ConsoleFileLogger {
        file: file.map(|p| Mutex::new(RefCell::new(File::create(p).expect("failed to create log file")))),
        verbose,
        colour,
    };
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(LevelFilter::Trace);
    Ok(())
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
