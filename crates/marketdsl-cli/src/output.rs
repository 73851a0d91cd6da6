use std::io::{self, Write};

use serde_json::Value;

use marketdsl_core::Envelope;

use crate::error::CliError;

/// Writes the envelope as one JSON document on stdout.
pub fn render(envelope: &Envelope<Value>, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{payload}")?;
    stdout.flush()?;
    Ok(())
}
