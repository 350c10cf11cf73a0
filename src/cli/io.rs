//! JSON output for one-shot commands
//!
//! One JSON object per line on stdout: `{"status":"ok","data":...}`.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::{json, Value};

use super::errors::CliResult;

pub fn write_response<T: Serialize>(data: &T) -> CliResult<()> {
    write_value(&json!({ "status": "ok", "data": data }))
}

fn write_value(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
