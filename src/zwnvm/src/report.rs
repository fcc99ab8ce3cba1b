//! Accumulated conversion report.
//!
//! A conversion keeps going after the first problem so that one pass over a
//! file surfaces every error it contains. The report collects everything
//! and the final verdict is taken once, at the end: an output image or JSON
//! document is only produced when the report carries no error.
//!
//! Parse errors (bad or missing JSON values) and store errors (failed nvm3
//! object reads/writes) are counted separately because one specific legacy
//! route-cache key is allowed to be missing (see `nvm700::store`), which
//! downgrades what would otherwise be a store error to a warning.

/// Message severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Diag,
    Info,
    Warning,
    Error,
}

/// One recorded diagnostic message.
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

/// Collects diagnostics and error counts for one conversion.
#[derive(Debug, Default, Clone)]
pub struct Report {
    messages: Vec<Message>,
    parse_errors: usize,
    store_errors: usize,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a JSON parse error (missing/mistyped key, bad value).
    pub fn parse_error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!("{text}");
        self.parse_errors += 1;
        self.messages.push(Message {
            severity: Severity::Error,
            text,
        });
    }

    /// Record a failed nvm3 object read or write.
    pub fn store_error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!("{text}");
        self.store_errors += 1;
        self.messages.push(Message {
            severity: Severity::Error,
            text,
        });
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{text}");
        self.messages.push(Message {
            severity: Severity::Warning,
            text,
        });
    }

    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{text}");
        self.messages.push(Message {
            severity: Severity::Info,
            text,
        });
    }

    pub fn diag(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!("{text}");
        self.messages.push(Message {
            severity: Severity::Diag,
            text,
        });
    }

    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    pub fn store_errors(&self) -> usize {
        self.store_errors
    }

    pub fn has_errors(&self) -> bool {
        self.parse_errors > 0 || self.store_errors > 0
    }

    /// All recorded messages, in the order they happened.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True when some recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.text.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_report_is_clean() {
        let report = Report::new();
        assert!(!report.has_errors());
        assert_eq!(report.parse_errors(), 0);
        assert_eq!(report.store_errors(), 0);
    }

    #[test]
    fn test_error_kinds_counted_separately() {
        let mut report = Report::new();
        report.parse_error("bad key");
        report.parse_error("bad value");
        report.store_error("read failed");
        assert_eq!(report.parse_errors(), 2);
        assert_eq!(report.store_errors(), 1);
        assert!(report.has_errors());
    }

    #[test]
    fn test_warnings_do_not_fail_the_conversion() {
        let mut report = Report::new();
        report.warning("something odd but tolerated");
        report.info("fyi");
        assert!(!report.has_errors());
        assert_eq!(report.messages().len(), 2);
    }

    #[test]
    fn test_contains_matches_recorded_text() {
        let mut report = Report::new();
        report.parse_error("ERROR: Required key not found: \"/zwController/nodeId\".");
        assert!(report.contains("Required key not found"));
        assert!(!report.contains("not of type DATA"));
    }
}
