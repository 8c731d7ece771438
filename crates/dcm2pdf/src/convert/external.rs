//! External converter process
//!
//! Spawned as `{executable} -v {source} {destination}` with an argument vector
//! (no shell). Exit status 0 is the only success signal.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::{ConversionError, Converter};

/// Longest stderr excerpt kept in a conversion error
const MAX_DIAGNOSTIC_LEN: usize = 2000;

#[derive(Debug, Clone)]
pub struct ExternalConverter {
    executable: PathBuf,
}

impl ExternalConverter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl Converter for ExternalConverter {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), ConversionError> {
        let source = std::path::absolute(source)?;
        let destination = std::path::absolute(destination)?;

        debug!(
            executable = %self.executable.display(),
            source = %source.display(),
            destination = %destination.display(),
            "Running converter"
        );

        let output = Command::new(&self.executable)
            .arg("-v")
            .arg(&source)
            .arg(&destination)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConversionError::Launch {
                executable: self.executable.display().to_string(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(ConversionError::Exit {
            code: output.status.code(),
            stderr: truncate(String::from_utf8_lossy(&output.stderr).trim(), MAX_DIAGNOSTIC_LEN),
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
