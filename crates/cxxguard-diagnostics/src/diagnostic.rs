//! Core diagnostic types for CxxGuard.

use serde::{Deserialize, Serialize};

/// A diagnostic produced by an analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique ID: RULE_CODE-file:line (e.g., "NULL001-handler.cc:18").
    pub id: String,
    /// Rule code (e.g., "NULL001").
    pub rule: String,
    /// Severity level.
    pub severity: Severity,
    /// Analysis confidence (0.0 to 1.0).
    pub confidence: f64,
    /// One-line summary.
    pub title: String,
    /// Detailed explanation of why this is a bug.
    pub explanation: String,
    /// Where the issue manifests.
    pub location: Location,
    /// The analysis pass that produced this diagnostic.
    pub source: DiagnosticSource,
}

/// Severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational finding.
    Info,
    /// Potential issue that should be addressed.
    Warning,
    /// Definite bug or serious issue.
    Error,
    /// Critical safety issue (null dereference).
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    /// Check if this severity is at or above a threshold.
    pub fn is_at_least(&self, threshold: Severity) -> bool {
        *self >= threshold
    }
}

/// Source code location. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Which analysis pass produced the diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSource {
    Nullability,
}

impl std::fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nullability => write!(f, "nullability"),
        }
    }
}

/// Builder for creating diagnostics conveniently.
pub struct DiagnosticBuilder {
    rule: String,
    severity: Severity,
    title: String,
    file: String,
    line: u32,
    column: u32,
    source: DiagnosticSource,
    confidence: f64,
    explanation: String,
}

impl DiagnosticBuilder {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        source: DiagnosticSource,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            title: title.into(),
            file: String::new(),
            line: 0,
            column: 0,
            source,
            confidence: 0.9,
            explanation: String::new(),
        }
    }

    pub fn location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self.column = column;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn build(self) -> Diagnostic {
        let id = format!("{}-{}:{}", self.rule, self.file, self.line);
        Diagnostic {
            id,
            rule: self.rule,
            severity: self.severity,
            confidence: self.confidence,
            title: self.title,
            explanation: self.explanation,
            location: Location {
                file: self.file,
                line: self.line,
                column: self.column,
            },
            source: self.source,
        }
    }
}

/// Summary of analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub critical: usize,
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

impl AnalysisSummary {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut summary = Self {
            critical: 0,
            error: 0,
            warning: 0,
            info: 0,
        };
        for diag in diagnostics {
            match diag.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Error => summary.error += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.critical + self.error + self.warning + self.info
    }

    pub fn has_issues_above(&self, threshold: Severity) -> bool {
        match threshold {
            Severity::Info => self.total() > 0,
            Severity::Warning => self.warning + self.error + self.critical > 0,
            Severity::Error => self.error + self.critical > 0,
            Severity::Critical => self.critical > 0,
        }
    }
}
