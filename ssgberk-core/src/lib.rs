//! SSGBERK Core Library
//!
//! Core library of the SSGBERK static-site-generator benchmark harness.
//! Provides test catalog discovery and validation, the measurement-type
//! registry, container orchestration, raw log parsing and the results store.

pub mod catalog;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod results;
pub mod types;

// Re-export commonly used types
pub use catalog::{TestCatalog, TestDescriptor};
pub use config::{ConfigLoader, HarnessConfig, NetworkMode};
pub use error::{
    CatalogError, HardValidationError, OrchestratorError, ResultsError, SsgError, SsgResult,
};
pub use orchestrator::{ContainerHandle, ContainerOrchestrator, Readiness};
pub use registry::{MeasurementRegistry, MeasurementSpec, MeasurementType};
pub use results::{MeasurementRecord, ResultsDocument, ResultsStore};
pub use types::{Approach, Classification, Os, TestName, VerifyResult};
