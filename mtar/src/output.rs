//! Output formatting for CLI commands.
//!
//! Reports go out as text or pretty JSON. Commands that stream an archive to
//! stdout send their report to stderr instead.

use anyhow::Result;
use mtar_core::{BlobInfo, Cid, DecodeStats, EncodeStats};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    to_stderr: bool,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            to_stderr: false,
        }
    }

    /// Send reports to stderr, keeping stdout for data.
    pub fn report_to_stderr(&mut self) {
        self.to_stderr = true;
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        let text = match self.format {
            OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(data)?),
            OutputFormat::Text => text_fn(),
        };
        if text.is_empty() {
            return Ok(());
        }

        if self.to_stderr {
            write!(io::stderr().lock(), "{}", text)?;
        } else {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{}", text)?;
            stdout.flush()?;
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error and its causes.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
    pub compression: String,
}

/// Output for `encode` command.
#[derive(Debug, Serialize)]
pub struct EncodeOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub stats: EncodeStats,
}

/// Output for `decode` and `verify` commands.
#[derive(Debug, Serialize)]
pub struct DecodeOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub stats: DecodeStats,
}

/// Blob stored during `put` command.
#[derive(Debug, Clone, Serialize)]
pub struct PutObject {
    pub cid: Cid,
    pub path: String,
}

/// Output for `put` command.
#[derive(Debug, Serialize)]
pub struct PutOutput {
    pub success: bool,
    pub result_code: u8,
    pub objects: Vec<PutObject>,
}

/// Output for `stat` command.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub blob: BlobInfo,
}
