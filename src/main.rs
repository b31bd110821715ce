#![cfg_attr(feature="clippy", feature(plugin))]
#![cfg_attr(feature="clippy", plugin(clippy))]

#[macro_use]
extern crate log;
extern crate argparse;
extern crate byteorder;
extern crate libc;
extern crate term;

use std::path::PathBuf;

use argparse::{ArgumentParser, ParseOption, Print, StoreFalse, StoreOption, StoreTrue};

mod debugdump;
mod loader;
mod logger;
mod translator;

use translator::Translator;
use translator::decode::decode;

struct CmdLineArgs {
    elf_file_path: Option<PathBuf>,
    log_file_path: Option<PathBuf>,
    single_disasm_arm: Option<String>,
    verbose: bool,
    colour: bool,
}

impl Default for CmdLineArgs {
    fn default() -> CmdLineArgs {
        CmdLineArgs {
            elf_file_path: None,
            log_file_path: None,
            single_disasm_arm: None,
            verbose: false,
            colour: true,
        }
    }
}

fn main() {
    let mut args = CmdLineArgs::default();
    parse_command_line(&mut args);
    configure_logging(&args);

    if handle_oneshot_commands(&args) {
        return;
    }

    let Some(elf_path) = args.elf_file_path.clone() else {
        error!("No ELF file given. Pass one with --elf PATH.");
        std::process::exit(1);
    };

    let image = match loader::load_elf(elf_path.as_path()) {
        Ok(image) => image,
        Err(e) => {
            error!("Failed loading `{}`:\n{}", elf_path.display(), e);
            std::process::exit(1);
        }
    };
    info!("Loaded `{}`, entry={:#010X}.", elf_path.display(), image.entry);

    let translator = Translator::new(image, args.verbose);
    translator.run();
}

fn parse_command_line(args: &mut CmdLineArgs) {
    let mut elf_file_path: Option<PathBuf> = None;
    let mut log_file_path: Option<PathBuf> = None;

    {
        let mut parser = ArgumentParser::new();
        parser.set_description("A dynamic binary translator for 32-bit ARM ELF executables.");
        parser.add_option(&["-V", "--version"],
                          Print(format!("armdbt v{}", env!("CARGO_PKG_VERSION"))),
                          "Show current version.");
        parser.refer(&mut elf_file_path)
              .add_option(&["--elf"], ParseOption, "Path to the ARM ELF executable to run.")
              .metavar("PATH");
        parser.refer(&mut log_file_path)
              .add_option(&["--log"], ParseOption, "Also write log messages to this file.")
              .metavar("PATH");
        parser.refer(&mut args.single_disasm_arm)
              .add_option(&["--dasm-arm"], StoreOption,
                          "Prints the disassembly of the given ARM state instruction. \
                           The instruction must be a hex number without base, e.g. 01F7344, \
                           in Big Endian format, i.e. the most significant byte is left.")
              .metavar("INST");
        parser.refer(&mut args.verbose)
              .add_option(&["-v","--verbose"], StoreTrue, "Dump guest registers after every sealed block.");
        parser.refer(&mut args.colour)
              .add_option(&["-c","--with-colour"], StoreTrue, "Enable terminal logging with colour codes. (default)")
              .add_option(&["-k","--without-colour"], StoreFalse, "Disable terminal logging with colour codes.");
        parser.parse_args_or_exit();
    }

    args.elf_file_path = elf_file_path;
    args.log_file_path = log_file_path;
}

fn configure_logging(args: &CmdLineArgs) {
    let p = args.log_file_path.as_deref();
    logger::init_with(p, args.verbose, args.colour).unwrap();
    if let Some(p) = p {
        info!("Logging to file `{}`.", p.display());
    }
}

/// Handles `--dasm-arm`, if given. Returns whether the process should
/// exit immediately afterwards rather than also trying to run an ELF.
fn handle_oneshot_commands(args: &CmdLineArgs) -> bool {
    let Some(x) = args.single_disasm_arm.as_ref() else { return false; };

    match u32::from_str_radix(x.as_str(), 16) {
        Ok(raw) => match decode(raw, 0) {
            Ok(inst) => info!("DASM ARM:\t{:?}", inst),
            Err(e)   => info!("DASM ARM invalid - {}", e),
        },
        Err(e) => error!("{}", e),
    };
    true
}
