//! Structured warnings and errors collected by batch operations (parameter
//! text parsing, image gathering during encode) so callers can surface them
//! instead of reading a console.
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Pass the offending input belongs to, when known.
    pub pass_id: Option<i32>,
    /// 1-based line number inside the parameter text.
    pub line_number: Option<usize>,
    /// The offending input: a parameter line or an image path.
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            pass_id: None,
            line_number: None,
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(subject, message)
        }
    }

    pub fn at_line(mut self, pass_id: i32, line_number: usize) -> Self {
        self.pass_id = Some(pass_id);
        self.line_number = Some(line_number);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        match (self.pass_id, self.line_number) {
            (Some(pass), Some(line)) => write!(f, " [pass {pass}, line {line}]")?,
            (Some(pass), None) => write!(f, " [pass {pass}]")?,
            _ => {}
        }
        write!(f, ": {} ({})", self.message, self.subject)
    }
}
