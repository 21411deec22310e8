// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Attribute schema for one sub-test.
//!
//! Recognized attributes are lower-cased and default to `none`; enum-valued
//! ones are checked against their allowed set. Anything else is kept as-is.

use std::path::Path;

use serde_json::Value;

use crate::error::{CatalogError, CatalogResult, SchemaError};
use crate::types::{attribute_text, Approach, Attributes, Classification, Os, NONE};

/// One recognized attribute.
struct Field {
    key: &'static str,
    required: bool,
    allowed: &'static [(&'static str, &'static str)],
}

const SCHEMA: &[Field] = &[
    Field {
        key: "language",
        required: true,
        allowed: &[],
    },
    Field {
        key: "webserver",
        required: false,
        allowed: &[],
    },
    Field {
        key: "classification",
        required: false,
        allowed: Classification::ALLOWED,
    },
    Field {
        key: "approach",
        required: false,
        allowed: Approach::ALLOWED,
    },
    Field {
        key: "frontend",
        required: false,
        allowed: &[],
    },
    Field {
        key: "generator",
        required: false,
        allowed: &[],
    },
    Field {
        key: "os",
        required: false,
        allowed: Os::ALLOWED,
    },
];

/// Whether an attribute holds a URL path.
fn is_url_key(key: &str) -> bool {
    key == "content" || key.ends_with("_url")
}

fn example_url(key: &str) -> &'static str {
    match key {
        "content" => "/json",
        "content_url" => "/content",
        _ => "/",
    }
}

/// URLs are optional, but when present must be non-empty paths.
pub fn validate_urls(test_name: &str, attributes: &Attributes) -> CatalogResult<()> {
    for (key, value) in attributes {
        if !is_url_key(key) || value.is_null() {
            continue;
        }

        let text = attribute_text(value).unwrap_or_default();
        if !value.is_string() || !text.starts_with('/') {
            return Err(CatalogError::UrlFormat {
                key: key.clone(),
                test: test_name.to_string(),
                value: text,
                example: example_url(key),
            });
        }
    }
    Ok(())
}

/// Validate and normalize one sub-test's attributes.
///
/// `directory` is the generator directory; its parent (the language
/// directory) is offered as the hint when `language` is missing.
pub fn validate(test_name: &str, raw: Attributes, directory: &Path) -> CatalogResult<Attributes> {
    validate_urls(test_name, &raw)?;

    let generator = raw
        .get("generator")
        .and_then(attribute_text)
        .unwrap_or_else(|| NONE.to_string());

    let mut normalized = raw;
    for field in SCHEMA {
        let value = normalized
            .get(field.key)
            .and_then(attribute_text)
            .unwrap_or_else(|| NONE.to_string())
            .to_lowercase();
        normalized.insert(field.key.to_string(), Value::String(value.clone()));

        if value == NONE {
            if field.required {
                let suggestion = directory
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Err(SchemaError::MissingLanguage {
                    test: test_name.to_string(),
                    generator,
                    suggestion,
                }
                .into());
            }
            continue;
        }

        if !field.allowed.is_empty()
            && !field
                .allowed
                .iter()
                .any(|(allowed, _)| allowed.eq_ignore_ascii_case(&value))
        {
            let suggestions = field
                .allowed
                .iter()
                .map(|(allowed, help)| format!("  `{}` -- {}", allowed.to_lowercase(), help))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(SchemaError::InvalidValue {
                key: field.key,
                value,
                test: test_name.to_string(),
                generator,
                suggestions,
            }
            .into());
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn dir() -> PathBuf {
        PathBuf::from("/srv/generators/ruby/jekyll")
    }

    #[test]
    fn test_missing_language_suggests_directory() {
        let err = validate("default", attrs(json!({"generator": "jekyll"})), &dir()).unwrap_err();
        match err {
            CatalogError::Schema(SchemaError::MissingLanguage { suggestion, .. }) => {
                assert_eq!(suggestion, "ruby");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_classification_lists_allowed_values() {
        let err = validate(
            "default",
            attrs(json!({"language": "Ruby", "classification": "unknown"})),
            &dir(),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("`classification`"));
        assert!(message.contains("`fullstack` --"));
        assert!(message.contains("`micro` --"));
        assert!(message.contains("`platform` --"));
    }

    #[test]
    fn test_normalizes_and_defaults() {
        let normalized = validate(
            "default",
            attrs(json!({
                "language": "Ruby",
                "classification": "Fullstack",
                "OS": "ignored-case-sensitive-key",
                "file_number": 100,
                "notes": "Keeps Case"
            })),
            &dir(),
        )
        .unwrap();

        assert_eq!(normalized["language"], "ruby");
        assert_eq!(normalized["classification"], "fullstack");
        assert_eq!(normalized["approach"], "none");
        assert_eq!(normalized["webserver"], "none");
        assert_eq!(normalized["os"], "none");
        assert_eq!(normalized["file_number"], 100);
        assert_eq!(normalized["notes"], "Keeps Case");
        assert_eq!(normalized["OS"], "ignored-case-sensitive-key");
    }

    #[test]
    fn test_enum_values_case_insensitive() {
        let normalized = validate(
            "default",
            attrs(json!({"language": "go", "approach": "REALISTIC", "os": "Linux"})),
            &dir(),
        )
        .unwrap();
        assert_eq!(normalized["approach"], "realistic");
        assert_eq!(normalized["os"], "linux");
    }

    #[test]
    fn test_url_must_start_with_slash() {
        let err = validate(
            "default",
            attrs(json!({"language": "go", "content_url": "posts"})),
            &dir(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UrlFormat { .. }));

        let err = validate(
            "default",
            attrs(json!({"language": "go", "content": ""})),
            &dir(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UrlFormat { .. }));

        assert!(validate(
            "default",
            attrs(json!({"language": "go", "content_url": "/posts"})),
            &dir()
        )
        .is_ok());
    }
}
