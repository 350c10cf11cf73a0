//! factline CLI entry point
//!
//! Parses arguments, dispatches through `cli::run` and exits non-zero on
//! failure. All wiring lives in the library.

use factline::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
