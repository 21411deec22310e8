//! Custom error types for SSGBERK.
//!
//! Explicit enum error types per subsystem.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the harness.
#[derive(Debug, Error)]
pub enum SsgError {
    // =========================================================================
    // Harness Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Subsystem Errors
    // =========================================================================
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Container error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Results error: {0}")]
    Results(#[from] ResultsError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors stop the harness before any test runs.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown measurement type '{name}' (known: {known})")]
    UnknownMeasurementType { name: String, known: String },

    #[error("Duplicate measurement type: {name}")]
    DuplicateMeasurementType { name: String },
}

/// Test catalog errors: discovery, config loading and schema checks.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unable to locate {target}: {reason}")]
    ConfigLookup { target: String, reason: String },

    #[error("Error loading config {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error(
        "`{key}` field in test \"{test}\" does not appear to be a valid url: \"{value}\"\n  Example `{key}` url: \"{example}\""
    )]
    UrlFormat {
        key: String,
        test: String,
        value: String,
        example: &'static str,
    },

    #[error("Invalid test name: {0}")]
    InvalidName(#[from] HardValidationError),

    #[error("Unable to locate tests {names:?}")]
    MissingTests { names: Vec<String> },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Schema violations in one sub-test's attributes.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(
        "Missing `language` for test \"{test}\" in generator \"{generator}\"; suggestion: `language` -- The language of the generator used, suggestion: {suggestion}"
    )]
    MissingLanguage {
        test: String,
        generator: String,
        suggestion: String,
    },

    #[error(
        "Invalid `{key}` value \"{value}\" specified for test \"{test}\" in generator \"{generator}\"; suggestions:\n{suggestions}"
    )]
    InvalidValue {
        key: &'static str,
        value: String,
        test: String,
        generator: String,
        suggestions: String,
    },
}

/// Container lifecycle errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to spawn {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Image build failed for {tag}: {message}")]
    BuildFailed { tag: String, message: String },

    #[error("Image build for {tag} exceeded {secs}s")]
    BuildTimeout { tag: String, secs: u64 },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: &'static str,
        status: String,
        stderr: String,
    },

    #[error("Container engine returned no container id for {image}")]
    MissingContainerId { image: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Results store errors. Most are logged and swallowed by the store itself.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed stats file {path}: {reason}")]
    StatsFormat { path: PathBuf, reason: String },

    #[error("Tool `{command}` failed: {reason}")]
    Tool { command: String, reason: String },
}

/// Result type alias using SsgError.
pub type SsgResult<T> = Result<T, SsgError>;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type alias for container operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Result type alias for results store operations.
pub type ResultsResult<T> = Result<T, ResultsError>;

/// Render an error and its source chain, one cause per line.
///
/// Used wherever a failure is written to a per-test log as a diagnostic trace.
pub fn diagnostic(err: &dyn std::error::Error) -> String {
    let mut out = format!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::MissingRequiredField {
            field: "root",
            context: "harness config".to_string(),
        };
        assert!(err.to_string().contains("root"));
        assert!(err.to_string().contains("harness config"));
    }

    #[test]
    fn test_error_chain() {
        let schema_err = SchemaError::MissingLanguage {
            test: "default".to_string(),
            generator: "jekyll".to_string(),
            suggestion: "ruby".to_string(),
        };
        let catalog_err: CatalogError = schema_err.into();
        let err: SsgError = catalog_err.into();
        assert!(matches!(err, SsgError::Catalog(CatalogError::Schema(_))));
        assert!(err.to_string().contains("ruby"));
    }

    #[test]
    fn test_diagnostic_includes_sources() {
        let err = OrchestratorError::Spawn {
            what: "docker build",
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "docker: not found"),
        };
        let trace = diagnostic(&err);
        assert!(trace.starts_with("Error: Failed to spawn docker build"));
        assert!(trace.contains("caused by: docker: not found"));
    }
}
