//! The logger adapter contract (§6).
//!
//! The engine's own internals log through `tracing`; this trait exists so
//! host applications can route handler- and plugin-authored log lines
//! through the same sink the engine uses, without requiring every embedder
//! to depend on `tracing` directly. [`TracingLoggerAdapter`] is the default,
//! bridging straight into `tracing`'s macros.

use serde_json::Value;

/// A minimal structured logger: four levels, each taking an optional
/// context value. No ordering or flushing guarantees are required of
/// implementations.
pub trait LoggerAdapter: Send + Sync {
    fn log(&self, message: &str, context: Option<&Value>);
    fn debug(&self, message: &str, context: Option<&Value>);
    fn warn(&self, message: &str, context: Option<&Value>);
    fn error(&self, message: &str, context: Option<&Value>, error: Option<&dyn std::error::Error>);
}

/// Forwards every call into `tracing`'s macros at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLoggerAdapter;

impl LoggerAdapter for TracingLoggerAdapter {
    fn log(&self, message: &str, context: Option<&Value>) {
        tracing::info!(context = ?context, "{message}");
    }

    fn debug(&self, message: &str, context: Option<&Value>) {
        tracing::debug!(context = ?context, "{message}");
    }

    fn warn(&self, message: &str, context: Option<&Value>) {
        tracing::warn!(context = ?context, "{message}");
    }

    fn error(&self, message: &str, context: Option<&Value>, error: Option<&dyn std::error::Error>) {
        tracing::error!(context = ?context, error = ?error.map(|e| e.to_string()), "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_adapter_accepts_every_level() {
        let logger = TracingLoggerAdapter;
        logger.log("started", None);
        logger.debug("detail", Some(&serde_json::json!({"state": "A"})));
        logger.warn("slow state", None);
        logger.error("handler failed", None, None);
    }
}
