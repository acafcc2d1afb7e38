//! Reporter trait for dependency injection
//!
//! Components report progress and recoverable failures through this trait
//! instead of reconfiguring a process-wide logger, so each call site decides
//! where diagnostics go (terminal, tracing, nowhere).

use crxkit_schema::ExtensionId;

/// Sink for progress and diagnostic events.
pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Fetching", "Packing").
    fn section(&self, title: &str);

    /// An endpoint is about to be tried (`index` is 1-based).
    fn attempt(&self, id: &ExtensionId, endpoint: &str, index: usize, total: usize);

    /// An endpoint was rejected; the fetch continues with the next one.
    fn rejected(&self, id: &ExtensionId, endpoint: &str, reason: &str);

    /// Updates the progress of a download.
    fn downloading(&self, id: &ExtensionId, current: u64, total: Option<u64>);

    /// Marks an operation on `id` as successfully completed.
    fn done(&self, id: &ExtensionId, detail: &str, size: Option<u64>);

    /// Marks an operation on `id` as failed with a specific reason.
    fn failed(&self, id: &ExtensionId, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn attempt(&self, id: &ExtensionId, endpoint: &str, index: usize, total: usize) {
        (**self).attempt(id, endpoint, index, total);
    }
    fn rejected(&self, id: &ExtensionId, endpoint: &str, reason: &str) {
        (**self).rejected(id, endpoint, reason);
    }
    fn downloading(&self, id: &ExtensionId, current: u64, total: Option<u64>) {
        (**self).downloading(id, current, total);
    }
    fn done(&self, id: &ExtensionId, detail: &str, size: Option<u64>) {
        (**self).done(id, detail, size);
    }
    fn failed(&self, id: &ExtensionId, reason: &str) {
        (**self).failed(id, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn attempt(&self, _: &ExtensionId, _: &str, _: usize, _: usize) {}
    fn rejected(&self, _: &ExtensionId, _: &str, _: &str) {}
    fn downloading(&self, _: &ExtensionId, _: u64, _: Option<u64>) {}
    fn done(&self, _: &ExtensionId, _: &str, _: Option<u64>) {}
    fn failed(&self, _: &ExtensionId, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}

/// Forwards every event to `tracing`, leaving filtering to the subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn section(&self, title: &str) {
        tracing::info!("{title}");
    }

    fn attempt(&self, id: &ExtensionId, endpoint: &str, index: usize, total: usize) {
        tracing::info!(%id, "trying endpoint {index}/{total}: {endpoint}");
    }

    fn rejected(&self, id: &ExtensionId, endpoint: &str, reason: &str) {
        tracing::warn!(%id, "endpoint rejected ({reason}): {endpoint}");
    }

    fn downloading(&self, id: &ExtensionId, current: u64, total: Option<u64>) {
        match total {
            Some(total) => tracing::trace!(%id, "downloaded {current}/{total} bytes"),
            None => tracing::trace!(%id, "downloaded {current} bytes"),
        }
    }

    fn done(&self, id: &ExtensionId, detail: &str, size: Option<u64>) {
        match size {
            Some(size) => tracing::info!(%id, size, "{detail}"),
            None => tracing::info!(%id, "{detail}"),
        }
    }

    fn failed(&self, id: &ExtensionId, reason: &str) {
        tracing::error!(%id, "{reason}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
}
