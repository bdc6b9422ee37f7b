//! JSON output for CLI commands
//!
//! One JSON object per line on stdout, UTF-8 only.

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;

/// Write `{"status":"ok","data":..}` to `out`
pub fn write_response_to(out: &mut impl Write, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    serde_json::to_writer(&mut *out, &response)?;
    writeln!(out)?;
    out.flush()?;

    Ok(())
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_response_to(&mut io::stdout().lock(), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_single_line() {
        let mut out = Vec::new();
        write_response_to(&mut out, serde_json::json!({"initialized": true})).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\"data\":{\"initialized\":true},\"status\":\"ok\"}\n");
    }
}
