//! Optional JavaScript minification through an external `terser`.
//!
//! Minifying is best effort. Any failure to produce output, including a
//! missing tool or a timeout, yields the original bytes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

/// Minifier executable looked up on `PATH`.
pub const MINIFIER_PROGRAM: &str = "terser";

/// Upper bound for a single minifier run.
pub const DEFAULT_MINIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to a minifier executable.
#[derive(Debug, Clone)]
pub struct Minifier {
    program: PathBuf,
    timeout: Duration,
}

impl Minifier {
    /// Find `terser` on `PATH`.
    pub fn locate() -> Option<Self> {
        match which::which(MINIFIER_PROGRAM) {
            Ok(path) => Some(Self::with_program(path)),
            Err(_) => {
                tracing::debug!("{MINIFIER_PROGRAM} not found on PATH, scripts are packed as-is");
                None
            }
        }
    }

    /// Use an explicit executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_MINIFY_TIMEOUT,
        }
    }

    /// Override the per-file timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Minified contents of the script at `path`, or `original` on any failure.
    pub fn minify(&self, path: &Path, original: &[u8]) -> Vec<u8> {
        match self.run(path) {
            Ok(Some(minified)) if !minified.is_empty() => minified,
            Ok(_) => original.to_vec(),
            Err(e) => {
                tracing::debug!(path = %path.display(), "minifier failed to run: {e}");
                original.to_vec()
            }
        }
    }

    fn run(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        let output = tempfile::Builder::new().suffix(".js").tempfile()?;

        let mut child = Command::new(&self.program)
            .arg(path)
            .args(["--compress", "--mangle", "--output"])
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        match child.wait_timeout(self.timeout)? {
            Some(status) if status.success() => Ok(Some(fs::read(output.path())?)),
            Some(status) => {
                tracing::debug!(path = %path.display(), %status, "minifier exited unsuccessfully");
                Ok(None)
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(path = %path.display(), "minifier timed out, keeping original");
                Ok(None)
            }
        }
    }
}
