//! Terminal output.

pub mod output;
pub mod theme;

use std::io::IsTerminal;

use crxkit_core::{ExtensionId, Reporter, TracingReporter};

pub use output::Output;

/// Where progress events go for this invocation.
///
/// Styled lines for a terminal; otherwise (or under `--quiet`) events are
/// logged, so only warnings and failures pass the default filter.
#[derive(Debug, Clone, Copy)]
pub enum Progress {
    /// Styled stderr lines.
    Styled(Output),
    /// `tracing` events.
    Logged(TracingReporter),
}

impl Progress {
    /// Pick the sink for an invocation.
    pub fn select(quiet: bool) -> Self {
        Self::for_terminal(quiet, std::io::stderr().is_terminal())
    }

    fn for_terminal(quiet: bool, stderr_is_terminal: bool) -> Self {
        if quiet || !stderr_is_terminal {
            Self::Logged(TracingReporter)
        } else {
            Self::Styled(Output)
        }
    }

    fn sink(&self) -> &dyn Reporter {
        match self {
            Self::Styled(output) => output,
            Self::Logged(tracing) => tracing,
        }
    }
}

impl Reporter for Progress {
    fn section(&self, title: &str) {
        self.sink().section(title);
    }

    fn attempt(&self, id: &ExtensionId, endpoint: &str, index: usize, total: usize) {
        self.sink().attempt(id, endpoint, index, total);
    }

    fn rejected(&self, id: &ExtensionId, endpoint: &str, reason: &str) {
        self.sink().rejected(id, endpoint, reason);
    }

    fn downloading(&self, id: &ExtensionId, current: u64, total: Option<u64>) {
        self.sink().downloading(id, current, total);
    }

    fn done(&self, id: &ExtensionId, detail: &str, size: Option<u64>) {
        self.sink().done(id, detail, size);
    }

    fn failed(&self, id: &ExtensionId, reason: &str) {
        self.sink().failed(id, reason);
    }

    fn info(&self, msg: &str) {
        self.sink().info(msg);
    }

    fn warning(&self, msg: &str) {
        self.sink().warning(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_or_piped_output_is_logged() {
        assert!(matches!(Progress::for_terminal(true, true), Progress::Logged(_)));
        assert!(matches!(Progress::for_terminal(false, false), Progress::Logged(_)));
        assert!(matches!(Progress::for_terminal(false, true), Progress::Styled(_)));
    }
}
