// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Test catalog: discovery, validation and expansion of generator configs.
//!
//! Layout on disk is `<root>/<language>/<generator>/benchmark_config.json`.
//! Each config expands into one test per sub-test; the result of
//! [`TestCatalog::gather`] is sorted by name so runs are deterministic.

mod descriptor;
pub mod schema;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{CatalogError, CatalogResult};
use crate::registry::MeasurementRegistry;
use crate::types::TestName;

pub use descriptor::{GeneratorConfig, TestDescriptor, TestMetadata};

/// File name of a generator's config inside its directory.
pub const CONFIG_FILE: &str = "benchmark_config.json";

/// Sub-test name that maps onto the bare generator name.
pub const DEFAULT_TEST: &str = "default";

/// Tests expanded from one config, plus non-fatal findings.
#[derive(Debug)]
pub struct ParsedGenerator {
    pub generator: String,
    pub tests: Vec<TestDescriptor>,
    pub warnings: Vec<String>,
}

/// Discovers and validates the tests under one root.
pub struct TestCatalog {
    root: PathBuf,
    registry: Arc<MeasurementRegistry>,
    languages: Vec<String>,
    directories: Vec<String>,
}

impl TestCatalog {
    /// Create a catalog over `root` using the run's measurement registry.
    pub fn new(root: impl Into<PathBuf>, registry: Arc<MeasurementRegistry>) -> Self {
        Self {
            root: root.into(),
            registry,
            languages: Vec::new(),
            directories: Vec::new(),
        }
    }

    /// Only discover generators of these languages.
    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    /// Only discover these `<language>/<generator>` directories.
    pub fn with_directories(mut self, directories: Vec<String>) -> Self {
        self.directories = directories;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &MeasurementRegistry {
        &self.registry
    }

    /// Every language directory under the root.
    pub fn languages(&self) -> CatalogResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| CatalogError::ConfigLookup {
            target: format!("generator root {}", self.root.display()),
            reason: e.to_string(),
        })?;

        let mut languages: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        languages.sort();
        Ok(languages)
    }

    /// Generator directories of one language, relative to the root.
    pub fn language_tests(&self, language: &str) -> CatalogResult<Vec<String>> {
        let lookup_error = |reason: String| CatalogError::ConfigLookup {
            target: format!("language directory {}", language),
            reason,
        };

        let entries =
            std::fs::read_dir(self.root.join(language)).map_err(|e| lookup_error(e.to_string()))?;

        let mut dirs: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| format!("{}/{}", language, e.file_name().to_string_lossy()))
            .collect();

        if dirs.is_empty() {
            return Err(lookup_error("no generator directories".to_string()));
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Config file of one `<language>/<generator>` directory.
    pub fn generator_config(&self, test_dir: &str) -> CatalogResult<PathBuf> {
        let path = self.root.join(test_dir).join(CONFIG_FILE);
        if path.is_file() {
            Ok(path)
        } else {
            Err(CatalogError::ConfigLookup {
                target: format!("tests in test-dir {}", test_dir),
                reason: format!("{} does not exist", path.display()),
            })
        }
    }

    /// Config files selected by the language and directory filters.
    ///
    /// A language filter replaces any directory filter; with neither, every
    /// config two levels below the root is returned.
    pub fn discover(&self) -> CatalogResult<Vec<PathBuf>> {
        let mut directories = self.directories.clone();

        if !self.languages.is_empty() {
            directories.clear();
            for language in &self.languages {
                directories.extend(self.language_tests(language)?);
            }
        }

        if !directories.is_empty() {
            return directories
                .iter()
                .map(|dir| self.generator_config(dir))
                .collect();
        }

        let mut configs = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| CatalogError::ConfigLookup {
                target: format!("generator root {}", self.root.display()),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_file() && entry.file_name() == CONFIG_FILE {
                configs.push(entry.into_path());
            }
        }

        tracing::debug!(root = %self.root.display(), configs = configs.len(), "Discovered configs");
        Ok(configs)
    }

    /// Read and deserialize one config file.
    pub fn load_config(&self, path: &Path) -> CatalogResult<GeneratorConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            context: "reading benchmark config",
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| CatalogError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Expand one config into validated test descriptors.
    pub fn parse_config(
        &self,
        config: &GeneratorConfig,
        directory: &Path,
    ) -> CatalogResult<ParsedGenerator> {
        let mut tests = Vec::new();
        let mut warnings = Vec::new();

        for group in &config.tests {
            if !group.contains_key(DEFAULT_TEST) {
                warnings.push(format!(
                    "Generator {} does not define a default test in {}",
                    config.generator, CONFIG_FILE
                ));
            }

            for (test_name, raw) in group {
                let mut raw = raw.clone();
                raw.insert(
                    "generator".to_string(),
                    Value::String(config.generator.clone()),
                );

                let attributes = schema::validate(test_name, raw, directory)?;
                let measurements = self.registry.supported(&attributes);

                // Renamed last so schema errors can still refer to `default`.
                let name = if test_name == DEFAULT_TEST {
                    config.generator.clone()
                } else {
                    format!("{}-{}", config.generator, test_name)
                };

                tests.push(TestDescriptor::new(
                    TestName::new(name)?,
                    directory,
                    measurements,
                    attributes,
                ));
            }
        }

        Ok(ParsedGenerator {
            generator: config.generator.clone(),
            tests,
            warnings,
        })
    }

    /// Load, validate and expand one config file.
    fn parse_file(&self, path: &Path) -> CatalogResult<ParsedGenerator> {
        let config = self.load_config(path)?;
        let directory = path.parent().unwrap_or(&self.root);
        self.parse_config(&config, directory)
    }

    /// Every runnable test after include/exclude filtering, sorted by name.
    ///
    /// With both filters empty everything is returned. Excluded names are
    /// removed after include filtering. A config that fails to load drops
    /// only its own generator; an included name that resolves to nothing
    /// fails the whole call.
    pub fn gather(&self, include: &[String], exclude: &[String]) -> CatalogResult<Vec<TestDescriptor>> {
        let include: HashSet<&str> = include.iter().map(String::as_str).collect();
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();

        let mut tests = Vec::new();
        let mut seen = HashSet::new();
        let mut resolved = HashSet::new();

        for path in self.discover()? {
            let parsed = match self.parse_file(&path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::error!(
                        config = %path.display(),
                        error = %e,
                        "Skipping generator with invalid configuration"
                    );
                    continue;
                }
            };

            for warning in &parsed.warnings {
                tracing::warn!(generator = %parsed.generator, "{}", warning);
            }

            for test in parsed.tests {
                let name = test.name.to_string();

                if !include.is_empty() && !include.contains(name.as_str()) {
                    continue;
                }
                resolved.insert(name.clone());

                if exclude.contains(name.as_str()) {
                    continue;
                }

                if !seen.insert(name.clone()) {
                    tracing::error!(
                        test = %name,
                        config = %path.display(),
                        "Duplicate test name; keeping the first definition"
                    );
                    continue;
                }

                tests.push(test);
            }
        }

        let missing: BTreeSet<String> = include
            .iter()
            .filter(|name| !resolved.contains(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CatalogError::MissingTests {
                names: missing.into_iter().collect(),
            });
        }

        tests.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tests)
    }

    /// Tests grouped by generator, same filtering as [`gather`](Self::gather).
    pub fn gather_generators(
        &self,
        include: &[String],
        exclude: &[String],
    ) -> CatalogResult<BTreeMap<String, Vec<TestDescriptor>>> {
        let mut generators: BTreeMap<String, Vec<TestDescriptor>> = BTreeMap::new();
        for test in self.gather(include, exclude)? {
            generators
                .entry(test.generator.clone())
                .or_default()
                .push(test);
        }
        Ok(generators)
    }

    /// Write `test_metadata.json` describing every test in the catalog.
    pub fn write_metadata(&self, path: &Path) -> CatalogResult<usize> {
        let metadata: Vec<TestMetadata> = self
            .gather(&[], &[])?
            .iter()
            .map(TestDescriptor::metadata)
            .collect();

        let json = serde_json::to_string_pretty(&metadata).map_err(|e| CatalogError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CatalogError::Io {
            context: "writing test metadata",
            source: e,
        })?;

        Ok(metadata.len())
    }
}

/// One directory per generator, taken from its first test.
pub fn generator_directories(tests: &[TestDescriptor]) -> BTreeMap<String, PathBuf> {
    let mut directories = BTreeMap::new();
    for test in tests {
        directories
            .entry(test.generator.clone())
            .or_insert_with(|| test.directory.clone());
    }
    directories
}
