//! CLI-facing error helpers.

use std::fmt;

#[derive(Debug)]
pub struct CliError {
    pub msg: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.msg.fmt(f)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Simple CLI error from string.
pub fn simple_cli_error(msg: &str) -> CliError {
    CliError {
        msg: msg.to_string(),
        source: None,
    }
}

/// Convert a codec error into a CLI error carrying its embedder code.
pub fn codec_cli_error<E>(context: &str, code: i32, err: E) -> CliError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CliError {
        msg: format!("{}: {} (code {})", context, err, code),
        source: Some(Box::new(err)),
    }
}
