//! 故障分类模块：将上报的故障映射为错误类型与严重程度。
//!
//! # Fault Classification
//!
//! Maps a raised fault to an [`ErrorKind`] and a [`Severity`]. Classification is
//! keyword based and fully deterministic: the same fault and context always yield
//! the same verdict, and nothing here has side effects.
//!
//! Severity starts from a fixed per-kind base and is escalated one level for each
//! of `is_critical_path` and `user_impact == High` found in the [`FaultContext`].
//!
//! ```rust
//! use adaptive_resilience::classify::{ErrorClassifier, ErrorKind, Fault, FaultContext, Severity};
//!
//! let classifier = ErrorClassifier::default();
//! let verdict = classifier.classify(
//!     &Fault::new("connection reset by peer"),
//!     &FaultContext::new().critical_path(true),
//! );
//! assert_eq!(verdict.kind, ErrorKind::Network);
//! assert_eq!(verdict.severity, Severity::High);
//! ```

use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Category of a runtime fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    System,
    Network,
    Memory,
    Timeout,
    Validation,
    Resource,
    Dependency,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::System,
        ErrorKind::Network,
        ErrorKind::Memory,
        ErrorKind::Timeout,
        ErrorKind::Validation,
        ErrorKind::Resource,
        ErrorKind::Dependency,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Network => "network",
            Self::Memory => "memory",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Resource => "resource",
            Self::Dependency => "dependency",
        }
    }

    /// Severity assigned before any context-driven escalation.
    #[inline]
    pub fn base_severity(&self) -> Severity {
        match self {
            Self::Validation => Severity::Low,
            Self::Resource | Self::Network | Self::Timeout => Severity::Medium,
            Self::Memory | Self::Dependency => Severity::High,
            Self::System => Severity::Critical,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Impact of a fault, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// One level up; `Critical` saturates.
    #[inline]
    pub fn escalate(self) -> Severity {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly a fault is felt by end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserImpact {
    Low,
    Medium,
    High,
}

impl FromStr for UserImpact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::validation_with_context(
                format!("unknown user impact '{}'", other),
                ErrorContext::new()
                    .with_field_path("userImpact")
                    .with_details("expected one of: low, medium, high")
                    .with_source("fault_context"),
            )),
        }
    }
}

/// Typed context attached to a reported fault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultContext {
    pub is_critical_path: bool,
    pub user_impact: Option<UserImpact>,
    /// Free-form details carried into logs and history; never used for classification.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl FaultContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn critical_path(mut self, critical: bool) -> Self {
        self.is_critical_path = critical;
        self
    }

    pub fn with_user_impact(mut self, impact: UserImpact) -> Self {
        self.user_impact = Some(impact);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Validate a loosely-typed context object at the reporting boundary.
    ///
    /// `isCriticalPath` must be a boolean and `userImpact` one of
    /// `low|medium|high`; every other key is kept as a string attribute.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(obj) => obj,
            _ => {
                return Err(Error::validation_with_context(
                    "fault context must be an object",
                    ErrorContext::new().with_source("fault_context"),
                ))
            }
        };

        let mut ctx = Self::default();
        for (key, v) in obj {
            match key.as_str() {
                "isCriticalPath" | "is_critical_path" => {
                    ctx.is_critical_path = v.as_bool().ok_or_else(|| {
                        Error::validation_with_context(
                            "isCriticalPath must be a boolean",
                            ErrorContext::new()
                                .with_field_path(key.clone())
                                .with_details(v.to_string())
                                .with_source("fault_context"),
                        )
                    })?;
                }
                "userImpact" | "user_impact" => {
                    let raw = v.as_str().ok_or_else(|| {
                        Error::validation_with_context(
                            "userImpact must be a string",
                            ErrorContext::new()
                                .with_field_path(key.clone())
                                .with_details(v.to_string())
                                .with_source("fault_context"),
                        )
                    })?;
                    ctx.user_impact = Some(raw.parse()?);
                }
                _ => {
                    let rendered = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    ctx.attributes.insert(key.clone(), rendered);
                }
            }
        }
        Ok(ctx)
    }
}

/// A raised fault as seen by the classifier: an optional type name plus its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub name: Option<String>,
    pub message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Capture a Rust error, using the last segment of its type name as the fault name.
    ///
    /// Trait objects carry no concrete type name, so only the message is kept.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let name = if full.starts_with("dyn ") {
            None
        } else {
            let base = full.split('<').next().unwrap_or(full);
            Some(base.rsplit("::").next().unwrap_or(base).to_string())
        };
        Self {
            name,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Result of classifying one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub severity: Severity,
}

static DEFAULT_RULES: Lazy<Vec<(Regex, ErrorKind)>> = Lazy::new(|| {
    [
        (r"(?i)timeout|timed out", ErrorKind::Timeout),
        (r"(?i)network|connection", ErrorKind::Network),
        (r"(?i)memory", ErrorKind::Memory),
        (r"(?i)validation|invalid", ErrorKind::Validation),
        (r"(?i)resource|not found", ErrorKind::Resource),
        (r"(?i)dependency|module", ErrorKind::Dependency),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("built-in pattern"), kind))
    .collect()
});

/// Keyword-based fault classifier.
///
/// Rules are tried in order against the fault message first, then against the
/// fault's type name; the first match wins and `System` is the fallback.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<(Regex, ErrorKind)>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a custom rule; it is consulted after the built-in ones.
    pub fn with_rule(mut self, pattern: &str, kind: ErrorKind) -> Result<Self> {
        let re = Regex::new(pattern).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid classification pattern: {}", e),
                ErrorContext::new()
                    .with_details(pattern.to_string())
                    .with_source("error_classifier"),
            )
        })?;
        self.rules.push((re, kind));
        Ok(self)
    }

    pub fn classify(&self, fault: &Fault, ctx: &FaultContext) -> Classification {
        let kind = self.kind_of(fault);
        Classification {
            kind,
            severity: Self::assess_severity(kind, ctx),
        }
    }

    pub fn kind_of(&self, fault: &Fault) -> ErrorKind {
        self.match_text(&fault.message)
            .or_else(|| fault.name.as_deref().and_then(|n| self.match_text(n)))
            .unwrap_or(ErrorKind::System)
    }

    pub fn assess_severity(kind: ErrorKind, ctx: &FaultContext) -> Severity {
        let mut severity = kind.base_severity();
        if ctx.is_critical_path {
            severity = severity.escalate();
        }
        if ctx.user_impact == Some(UserImpact::High) {
            severity = severity.escalate();
        }
        severity
    }

    fn match_text(&self, text: &str) -> Option<ErrorKind> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, kind)| *kind)
    }
}
