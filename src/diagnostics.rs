// 🩺 Diagnostics - Anomalies as data, not exceptions
// Every warning is attributable to a specific client/form/field so a
// reviewer can trace it back to the export line that produced it.

use serde::{Deserialize, Serialize};

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Data was lost or a batch boundary is broken
    Warning,  // Data is questionable but fully retained
    Info,     // Advisory only (e.g. overflow-list sum divergence)
}

// ============================================================================
// WARNING KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Line matched no marker and was passed through untouched
    UnrecognizedLine,

    /// Structural line arrived with no context to attach it to
    StrayLine,

    /// Client begin line found but its header did not parse fully
    MalformedHeader,

    /// Client batch hit end-of-input before its end marker
    MalformedBatch,

    /// Overflow list closed with a different row count than declared
    ListCountMismatch,

    /// Overflow list rows do not sum to the parent field value
    ListSumDivergence,

    /// Two header sections declared the same structural index
    DuplicateIndex,

    /// Section marker seen outside any form
    OrphanSection,
}

// ============================================================================
// PARSE WARNING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub severity: Severity,
    pub kind: WarningKind,
    pub client: Option<String>,
    pub form: Option<String>,
    pub field: Option<String>,
    pub line: Option<usize>,
    pub message: String,
}

impl ParseWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        ParseWarning {
            severity,
            kind,
            client: None,
            form: None,
            field: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {:?}", self.severity, self.kind)?;
        if let Some(client) = &self.client {
            write!(f, " client={}", client)?;
        }
        if let Some(form) = &self.form {
            write!(f, " form={}", form)?;
        }
        if let Some(field) = &self.field {
            write!(f, " field={}", field)?;
        }
        if let Some(line) = self.line {
            write!(f, " line={}", line)?;
        }
        write!(f, ": {}", self.message)
    }
}

// ============================================================================
// DIAGNOSTICS COLLECTOR
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<ParseWarning>,
    pub unrecognized_lines: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, warnings: Vec<ParseWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn count_unrecognized(&mut self, lines: usize) {
        self.unrecognized_lines += lines;
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn has_critical(&self) -> bool {
        self.warnings.iter().any(|w| w.severity == Severity::Critical)
    }

    pub fn of_kind(&self, kind: WarningKind) -> Vec<&ParseWarning> {
        self.warnings.iter().filter(|w| w.kind == kind).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} warnings ({} critical), {} unrecognized lines",
            self.warnings.len(),
            self.warnings
                .iter()
                .filter(|w| w.severity == Severity::Critical)
                .count(),
            self.unrecognized_lines
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_builder_attribution() {
        let w = ParseWarning::new(WarningKind::DuplicateIndex, Severity::Warning, "index 2 reused")
            .with_client("SMITH")
            .with_form("881")
            .with_line(42);

        assert_eq!(w.client.as_deref(), Some("SMITH"));
        assert_eq!(w.form.as_deref(), Some("881"));
        assert_eq!(w.line, Some(42));
        let text = w.to_string();
        assert!(text.contains("client=SMITH"));
        assert!(text.contains("line=42"));
    }

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = Diagnostics::new();
        diag.push(ParseWarning::new(
            WarningKind::MalformedBatch,
            Severity::Critical,
            "no end marker",
        ));
        diag.push(ParseWarning::new(
            WarningKind::ListSumDivergence,
            Severity::Info,
            "off by 12",
        ));
        diag.count_unrecognized(3);

        assert_eq!(diag.warning_count(), 2);
        assert!(diag.has_critical());
        assert_eq!(diag.of_kind(WarningKind::ListSumDivergence).len(), 1);
        assert_eq!(diag.summary(), "2 warnings (1 critical), 3 unrecognized lines");
    }
}
