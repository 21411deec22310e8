//! Measurement-type registry.
//!
//! Built once per run and handed to the catalog and the driver. Each type
//! declares the attributes it needs, so support is a pure capability check
//! over a test's attributes.

use std::collections::BTreeMap;

use crate::error::HardValidationError;
use crate::types::{attribute_text, Attributes};

/// One attribute a measurement type reads, and the script variable it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Param {
    attribute: String,
    variable: String,
}

/// A kind of benchmark and the parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementType {
    name: String,
    script: String,
    required: Vec<Param>,
    forwarded: Vec<Param>,
}

impl MeasurementType {
    /// Declare a measurement type run by `script` inside the utility image.
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            required: Vec::new(),
            forwarded: Vec::new(),
        }
    }

    /// Require an attribute; it is passed to the script under the same name.
    pub fn require(mut self, attribute: &str) -> Self {
        self.required.push(Param {
            attribute: attribute.to_string(),
            variable: attribute.to_string(),
        });
        self
    }

    /// Pass an optional attribute to the script as `variable` when present.
    pub fn forward(mut self, attribute: &str, variable: &str) -> Self {
        self.forwarded.push(Param {
            attribute: attribute.to_string(),
            variable: variable.to_string(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Names of the attributes a test must declare to run this type.
    pub fn required_attributes(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(|p| p.attribute.as_str())
    }

    /// Whether every required attribute is present and non-null.
    pub fn supports(&self, attributes: &Attributes) -> bool {
        self.required.iter().all(|p| {
            attributes
                .get(&p.attribute)
                .and_then(attribute_text)
                .is_some()
        })
    }

    /// Build the per-test spec, or `None` if the test lacks a required attribute.
    pub fn specialize(&self, attributes: &Attributes) -> Option<MeasurementSpec> {
        if !self.supports(attributes) {
            return None;
        }

        let mut params = BTreeMap::new();
        for param in self.required.iter().chain(&self.forwarded) {
            if let Some(value) = attributes.get(&param.attribute).and_then(attribute_text) {
                params.insert(param.variable.clone(), value);
            }
        }

        Some(MeasurementSpec {
            type_name: self.name.clone(),
            script: self.script.clone(),
            params,
        })
    }
}

/// A measurement type bound to one test's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSpec {
    type_name: String,
    script: String,
    params: BTreeMap<String, String>,
}

impl MeasurementSpec {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Environment handed to the benchmark script for test `name`.
    pub fn script_variables(&self, name: &str) -> BTreeMap<String, String> {
        let mut vars = self.params.clone();
        vars.insert("name".to_string(), name.to_string());
        vars
    }
}

/// Ordered set of measurement types for one run.
///
/// Registration order is the tie-break when types are sorted by name length.
#[derive(Debug, Clone, Default)]
pub struct MeasurementRegistry {
    types: Vec<MeasurementType>,
}

impl MeasurementRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self { types: Vec::new() }
    }

    /// Registry with every measurement type the harness ships.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.types.push(
            MeasurementType::new("build", "build.sh")
                .require("file_number")
                .require("file_size")
                .forward("port", "port")
                .forward("content_url", "content_url")
                .forward("content_header", "header")
                .forward("build_command", "build_command"),
        );
        registry
    }

    /// Register a new type.
    /// Returns HardValidationError if a type with that name already exists.
    pub fn register(&mut self, measurement: MeasurementType) -> Result<(), HardValidationError> {
        if self.contains(measurement.name()) {
            return Err(HardValidationError::DuplicateMeasurementType {
                name: measurement.name().to_string(),
            });
        }
        self.types.push(measurement);
        Ok(())
    }

    /// Keep only `name`, or everything when `name` is `None`.
    pub fn select(self, name: Option<&str>) -> Result<Self, HardValidationError> {
        let Some(name) = name else {
            return Ok(self);
        };

        if !self.contains(name) {
            return Err(HardValidationError::UnknownMeasurementType {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            });
        }

        Ok(Self {
            types: self.types.into_iter().filter(|t| t.name() == name).collect(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.iter().any(|t| t.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&MeasurementType> {
        self.types.iter().find(|t| t.name() == name)
    }

    /// Type names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Specs for every type the attributes support, in execution order.
    ///
    /// Shorter names run first; equal lengths keep registration order, so
    /// long-named types always run last for a generator.
    pub fn supported(&self, attributes: &Attributes) -> Vec<MeasurementSpec> {
        let mut specs: Vec<MeasurementSpec> = self
            .types
            .iter()
            .filter_map(|t| t.specialize(attributes))
            .collect();
        specs.sort_by_key(|s| s.type_name().len());
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_standard_registry() {
        let registry = MeasurementRegistry::standard();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["build"]);
        let build = registry.get("build").unwrap();
        assert_eq!(
            build.required_attributes().collect::<Vec<_>>(),
            vec!["file_number", "file_size"]
        );
    }

    #[test]
    fn test_capability_query() {
        let build = MeasurementType::new("build", "build.sh")
            .require("file_number")
            .require("file_size");

        assert!(build.supports(&attrs(json!({"file_number": 100, "file_size": 1024}))));
        assert!(!build.supports(&attrs(json!({"file_number": 100}))));
        assert!(!build.supports(&attrs(json!({"file_number": 100, "file_size": null}))));
        assert!(build.specialize(&attrs(json!({}))).is_none());
    }

    #[test]
    fn test_script_variables() {
        let registry = MeasurementRegistry::standard();
        let spec = registry
            .get("build")
            .unwrap()
            .specialize(&attrs(json!({
                "file_number": 10,
                "file_size": "2048",
                "content_header": "---",
                "port": 4000
            })))
            .unwrap();

        let vars = spec.script_variables("jekyll");
        assert_eq!(vars["name"], "jekyll");
        assert_eq!(vars["file_number"], "10");
        assert_eq!(vars["file_size"], "2048");
        assert_eq!(vars["header"], "---");
        assert_eq!(vars["port"], "4000");
        assert!(!vars.contains_key("build_command"));
    }

    #[test]
    fn test_order_by_length_then_registration() {
        let mut registry = MeasurementRegistry::new();
        for name in ["build", "json", "query"] {
            registry
                .register(MeasurementType::new(name, format!("{}.sh", name)))
                .unwrap();
        }

        let order: Vec<String> = registry
            .supported(&Attributes::new())
            .iter()
            .map(|s| s.type_name().to_string())
            .collect();
        assert_eq!(order, vec!["json", "build", "query"]);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = MeasurementRegistry::standard();
        assert!(registry
            .register(MeasurementType::new("build", "other.sh"))
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_select() {
        let registry = MeasurementRegistry::standard();
        assert_eq!(registry.clone().select(None).unwrap().len(), 1);
        assert_eq!(registry.clone().select(Some("build")).unwrap().len(), 1);
        assert!(registry.select(Some("json")).is_err());
    }
}
