//! Progress output for interactive use.
//!
//! Everything goes to stderr so stdout stays clean for ids, paths and JSON.

use crossterm::style::Stylize;
use crxkit_core::{ExtensionId, Reporter};

use super::theme::format_size;

/// Reporter that prints styled progress lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output;

impl Reporter for Output {
    fn section(&self, title: &str) {
        eprintln!("{}", title.bold());
    }

    fn attempt(&self, _id: &ExtensionId, endpoint: &str, index: usize, total: usize) {
        eprintln!("  {} {}", format!("[{index}/{total}]").dark_grey(), endpoint.dark_grey());
    }

    fn rejected(&self, _id: &ExtensionId, _endpoint: &str, reason: &str) {
        eprintln!("  {} {reason}", "✗".yellow());
    }

    fn downloading(&self, _id: &ExtensionId, _current: u64, _total: Option<u64>) {}

    fn done(&self, id: &ExtensionId, detail: &str, size: Option<u64>) {
        match size {
            Some(size) => eprintln!(
                "{} {} {detail} {}",
                "✓".green().bold(),
                id.as_str().dark_grey(),
                format!("({})", format_size(size)).dark_grey()
            ),
            None => eprintln!("{} {} {detail}", "✓".green().bold(), id.as_str().dark_grey()),
        }
    }

    fn failed(&self, id: &ExtensionId, reason: &str) {
        eprintln!("{} {} {reason}", "✗".red().bold(), id.as_str().dark_grey());
    }

    fn info(&self, msg: &str) {
        eprintln!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }
}
