// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Test descriptors produced by the catalog.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::MeasurementSpec;
use crate::types::{attribute_text, Approach, Attributes, Classification, Os, TestName, NONE};

/// One `benchmark_config.json` document.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub generator: String,
    /// Groups of named sub-tests; each group shares nothing but its position.
    pub tests: Vec<BTreeMap<String, Attributes>>,
}

/// A fully validated, runnable test.
#[derive(Debug, Clone)]
pub struct TestDescriptor {
    pub name: TestName,
    pub directory: PathBuf,
    pub generator: String,
    pub language: String,
    pub classification: Option<Classification>,
    pub approach: Option<Approach>,
    pub webserver: String,
    pub frontend: String,
    pub os: Option<Os>,
    pub display_name: String,
    pub notes: String,
    pub versus: String,
    /// Measurement specs in execution order.
    pub measurements: Vec<MeasurementSpec>,
    /// Normalized attributes, including ones the harness does not interpret.
    pub attributes: Attributes,
}

impl TestDescriptor {
    /// Build a descriptor from attributes already normalized by the schema.
    pub fn new(
        name: TestName,
        directory: &Path,
        measurements: Vec<MeasurementSpec>,
        attributes: Attributes,
    ) -> Self {
        let text = |key: &str| attributes.get(key).and_then(attribute_text);
        let descriptor = |key: &str| text(key).unwrap_or_else(|| NONE.to_string());

        Self {
            directory: directory.to_path_buf(),
            generator: descriptor("generator"),
            language: descriptor("language"),
            classification: Classification::parse(&descriptor("classification")),
            approach: Approach::parse(&descriptor("approach")),
            webserver: descriptor("webserver"),
            frontend: descriptor("frontend"),
            os: Os::parse(&descriptor("os")),
            display_name: text("display_name").unwrap_or_else(|| name.to_string()),
            notes: text("notes").unwrap_or_default(),
            versus: text("versus").unwrap_or_default(),
            name,
            measurements,
            attributes,
        }
    }

    /// Dockerfile inside `directory` that builds this test.
    pub fn dockerfile(&self) -> String {
        format!("{}.dockerfile", self.name)
    }

    /// Port the test serves on, if declared.
    pub fn port(&self) -> Option<u16> {
        self.attributes
            .get("port")
            .and_then(attribute_text)
            .and_then(|p| p.parse().ok())
    }

    pub fn measurement(&self, type_name: &str) -> Option<&MeasurementSpec> {
        self.measurements
            .iter()
            .find(|m| m.type_name() == type_name)
    }

    /// Measurement type names in execution order.
    pub fn measurement_names(&self) -> impl Iterator<Item = &str> {
        self.measurements.iter().map(|m| m.type_name())
    }

    /// Public metadata entry for `test_metadata.json`.
    pub fn metadata(&self) -> TestMetadata {
        TestMetadata {
            name: self.name.to_string(),
            approach: self.approach.map_or(NONE, |a| a.as_str()).to_string(),
            classification: self
                .classification
                .map_or(NONE, |c| c.as_str())
                .to_string(),
            generator: self.generator.clone(),
            language: self.language.clone(),
            frontend: self.frontend.clone(),
            webserver: self.webserver.clone(),
            os: self.os.map_or(NONE, |o| o.as_str()).to_string(),
            display_name: self.display_name.clone(),
            notes: self.notes.clone(),
            versus: self.versus.clone(),
        }
    }
}

/// Serializable summary of a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMetadata {
    pub name: String,
    pub approach: String,
    pub classification: String,
    pub generator: String,
    pub language: String,
    pub frontend: String,
    pub webserver: String,
    pub os: String,
    pub display_name: String,
    pub notes: String,
    pub versus: String,
}
