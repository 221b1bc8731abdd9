//! Aggregate error model for keep-going traversals.

use std::fmt;

use tracing::warn;

use crate::error::{FsError, FsResult};

/// Kind of recursive operation an aggregate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRecursiveOperation {
    Copy,
    Deletion,
}

impl EnumRecursiveOperation {
    fn prefix(self) -> &'static str {
        match self {
            Self::Copy => "[COPY]",
            Self::Deletion => "[DELETE]",
        }
    }
}

/// Ordered list of errors collected during one keep-going walk.
///
/// An empty aggregate means the operation succeeded.
#[derive(Debug)]
pub struct RecursiveOperationError {
    /// Operation the errors were collected for.
    pub rule_operation: EnumRecursiveOperation,
    errors: Vec<FsError>,
}

impl RecursiveOperationError {
    pub fn new(rule_operation: EnumRecursiveOperation) -> Self {
        Self {
            rule_operation,
            errors: Vec::new(),
        }
    }

    /// Record one error, keeping encounter order.
    pub fn add_error(&mut self, exception: FsError) {
        warn!(
            operation = self.rule_operation.prefix(),
            error = %exception,
            "recursive operation error recorded"
        );
        self.errors.push(exception);
    }

    /// Collected errors in encounter order.
    pub fn errors(&self) -> &[FsError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FsError> {
        self.errors
    }

    /// Number of collected errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` when nothing was recorded, otherwise the aggregate as an error.
    pub fn into_result(self) -> FsResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        Err(FsError::Recursive(self))
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let l_messages = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>();
        format!(
            "{prefix} errors={} [{}]",
            self.error_count(),
            l_messages.join("; ")
        )
    }
}

impl fmt::Display for RecursiveOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(self.rule_operation.prefix()))
    }
}

impl std::error::Error for RecursiveOperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{EnumRecursiveOperation, RecursiveOperationError};
    use crate::error::FsError;

    #[test]
    fn empty_aggregate_is_success() {
        let report = RecursiveOperationError::new(EnumRecursiveOperation::Copy);
        assert!(report.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn aggregate_keeps_order_and_formats() {
        let mut report = RecursiveOperationError::new(EnumRecursiveOperation::Deletion);
        report.add_error(FsError::AccessDenied("/a".to_string()));
        report.add_error(FsError::NoSuchFile("/b".to_string()));
        assert_eq!(report.error_count(), 2);
        assert_eq!(
            report.to_string(),
            "[DELETE] errors=2 [access denied: /a; no such file: /b]"
        );

        let err = report.into_result().expect_err("must fail");
        let FsError::Recursive(report) = err else {
            panic!("expected aggregate");
        };
        assert!(matches!(report.errors()[0], FsError::AccessDenied(_)));
        assert!(matches!(report.errors()[1], FsError::NoSuchFile(_)));
    }
}
