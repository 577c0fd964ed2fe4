//! OperationOutcome bodies.
//!
//! Every error response, and every response that carries warnings, uses an
//! OperationOutcome built here.

use serde_json::{Value, json};

/// Issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Processing cannot continue.
    Fatal,
    /// Processing has failed.
    Error,
    /// Processing succeeded with concerns.
    Warning,
    /// Informational only.
    Information,
}

impl IssueSeverity {
    /// Returns the wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Fatal => "fatal",
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        }
    }
}

/// Issue type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    /// Invalid content.
    Invalid,
    /// Required element missing.
    Required,
    /// Resource not found.
    NotFound,
    /// Resource was deleted.
    Deleted,
    /// Criteria matched more than one resource.
    MultipleMatches,
    /// Conflict with the current version.
    Conflict,
    /// Resource already exists.
    Duplicate,
    /// Content or operation not supported.
    NotSupported,
    /// Processing failed.
    Processing,
    /// Request took too long.
    Timeout,
    /// Temporary failure; retry later.
    Transient,
    /// Unexpected server error.
    Exception,
    /// Work was bounded.
    TooCostly,
    /// Informational message.
    Informational,
}

impl IssueType {
    /// Returns the wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Invalid => "invalid",
            IssueType::Required => "required",
            IssueType::NotFound => "not-found",
            IssueType::Deleted => "deleted",
            IssueType::MultipleMatches => "multiple-matches",
            IssueType::Conflict => "conflict",
            IssueType::Duplicate => "duplicate",
            IssueType::NotSupported => "not-supported",
            IssueType::Processing => "processing",
            IssueType::Timeout => "timeout",
            IssueType::Transient => "transient",
            IssueType::Exception => "exception",
            IssueType::TooCostly => "too-costly",
            IssueType::Informational => "informational",
        }
    }
}

/// A single issue.
#[derive(Debug, Clone)]
pub struct Issue {
    /// Severity.
    pub severity: IssueSeverity,
    /// Type code.
    pub code: IssueType,
    /// Human-readable description.
    pub details: String,
    /// Location of the problem, as an element path.
    pub expression: Option<String>,
}

impl Issue {
    /// Creates an issue.
    pub fn new(severity: IssueSeverity, code: IssueType, details: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            details: details.into(),
            expression: None,
        }
    }

    /// Creates an error issue.
    pub fn error(code: IssueType, details: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, details)
    }

    /// Creates a warning issue.
    pub fn warning(code: IssueType, details: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, code, details)
    }

    /// Sets the element path.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Converts to JSON.
    pub fn to_json(&self) -> Value {
        let mut issue = json!({
            "severity": self.severity.as_str(),
            "code": self.code.as_str(),
            "details": {
                "text": self.details
            }
        });

        if let Some(expr) = &self.expression {
            issue["expression"] = json!([expr]);
        }

        issue
    }
}

/// Builder for OperationOutcome resources.
#[derive(Debug, Default)]
pub struct OperationOutcomeBuilder {
    issues: Vec<Issue>,
}

impl OperationOutcomeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issue.
    pub fn add_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    /// Adds an error issue.
    pub fn error(self, code: IssueType, details: impl Into<String>) -> Self {
        self.add_issue(Issue::error(code, details))
    }

    /// Adds a warning issue.
    pub fn warning(self, code: IssueType, details: impl Into<String>) -> Self {
        self.add_issue(Issue::warning(code, details))
    }

    /// Returns true if no issue was added.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Builds the OperationOutcome.
    pub fn build(self) -> Value {
        let issues: Vec<Value> = self.issues.iter().map(Issue::to_json).collect();

        json!({
            "resourceType": "OperationOutcome",
            "issue": issues
        })
    }
}

/// Creates an OperationOutcome with one error issue.
pub fn error_outcome(code: IssueType, message: &str) -> Value {
    OperationOutcomeBuilder::new().error(code, message).build()
}
