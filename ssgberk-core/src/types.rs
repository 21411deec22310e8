// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers and schema enums for validated inputs.
//!
//! Values are checked once at construction so the rest of the harness can
//! rely on them without re-validating.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HardValidationError;

/// Sentinel stored for every recognized attribute the config leaves unset.
pub const NONE: &str = "none";

/// Attribute map of one sub-test, as read from `benchmark_config.json`.
pub type Attributes = serde_json::Map<String, Value>;

/// Render an attribute value as plain text.
///
/// Strings are returned without quotes; `null` counts as absent.
pub fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Validated test name.
/// Must be non-empty and usable as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestName(String);

impl TestName {
    /// Create a new TestName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "test_name",
                value: name,
                reason: "Test name cannot be empty".to_string(),
            });
        }

        if name
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "test_name",
                value: name,
                reason: "Test name must not contain whitespace or path separators".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TestName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TestName> for String {
    fn from(name: TestName) -> Self {
        name.0
    }
}

/// Generator classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Fullstack,
    Micro,
    Platform,
}

impl Classification {
    /// Allowed values with their help text, in display order.
    pub const ALLOWED: &'static [(&'static str, &'static str)] = &[
        (
            "Fullstack",
            "Generator with a full toolchain: templating, asset pipeline, plugins",
        ),
        (
            "Micro",
            "Minimal generator that only renders content into pages",
        ),
        (
            "Platform",
            "Building blocks a generator is assembled from, no opinionated pipeline",
        ),
    ];

    /// Case-insensitive lookup.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fullstack" => Some(Self::Fullstack),
            "micro" => Some(Self::Micro),
            "platform" => Some(Self::Platform),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fullstack => "fullstack",
            Self::Micro => "micro",
            Self::Platform => "platform",
        }
    }
}

/// Implementation approach of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approach {
    Realistic,
    Stripped,
}

impl Approach {
    pub const ALLOWED: &'static [(&'static str, &'static str)] = &[
        (
            "Realistic",
            "Uses the generator the way its documentation recommends",
        ),
        (
            "Stripped",
            "Removes features a production site would normally keep",
        ),
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "realistic" => Some(Self::Realistic),
            "stripped" => Some(Self::Stripped),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Realistic => "realistic",
            Self::Stripped => "stripped",
        }
    }
}

/// Host operating system a test is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Windows,
}

impl Os {
    pub const ALLOWED: &'static [(&'static str, &'static str)] = &[
        (
            "Linux",
            "Our best-supported host OS, it is recommended that you build your tests for Linux hosts",
        ),
        (
            "Windows",
            "Not fully compatible yet; Windows hosts are supported on a best-effort basis",
        ),
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

/// Verification verdict for one test and measurement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerifyResult {
    Pass,
    Warn,
    Fail,
}

impl VerifyResult {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_name_valid() {
        assert!(TestName::new("jekyll").is_ok());
        assert!(TestName::new("hugo-minimal").is_ok());
        assert!(TestName::new("eleventy_v2.0").is_ok());
    }

    #[test]
    fn test_test_name_invalid() {
        assert!(TestName::new("").is_err());
        assert!(TestName::new("two words").is_err());
        assert!(TestName::new("a/b").is_err());
    }

    #[test]
    fn test_enum_parse_is_case_insensitive() {
        assert_eq!(
            Classification::parse("FullStack"),
            Some(Classification::Fullstack)
        );
        assert_eq!(Approach::parse("STRIPPED"), Some(Approach::Stripped));
        assert_eq!(Os::parse("linux"), Some(Os::Linux));
        assert_eq!(Classification::parse("unknown"), None);
    }

    #[test]
    fn test_verify_result_serializes_uppercase() {
        let json = serde_json::to_string(&VerifyResult::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
        let back: VerifyResult = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(back, VerifyResult::Fail);
    }

    #[test]
    fn test_attribute_text() {
        assert_eq!(
            attribute_text(&Value::String("x".into())),
            Some("x".to_string())
        );
        assert_eq!(attribute_text(&serde_json::json!(100)), Some("100".into()));
        assert_eq!(attribute_text(&Value::Null), None);
    }
}
