//! CLI module for factline
//!
//! - serve: HTTP API, job worker and nightly refresh schedule
//! - recompute: one-shot fact recompute
//! - explain: one-shot explanation
//! - print-config / templates: inspection

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, EntityKind, TargetArgs, VerbosityArg};
pub use commands::{explain, print_config, recompute, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
