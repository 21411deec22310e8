// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ssgberk list` command - List tests from the generator tree.

use std::sync::Arc;

use ssgberk_core::{ConfigLoader, MeasurementRegistry, TestCatalog};

/// File written by `ssgberk list --metadata`.
const METADATA_FILE: &str = "test_metadata.json";

pub async fn execute(config_path: &str, metadata: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;
    let catalog = TestCatalog::new(
        config.lang_root(),
        Arc::new(MeasurementRegistry::standard()),
    );

    if metadata {
        let results_root = config.results_root();
        std::fs::create_dir_all(&results_root)?;
        let path = results_root.join(METADATA_FILE);
        let count = catalog.write_metadata(&path)?;
        println!("Wrote metadata for {} test(s) to {}", count, path.display());
        return Ok(());
    }

    let tests = catalog.gather(&[], &[])?;
    if tests.is_empty() {
        println!("No tests found under {}.", catalog.root().display());
        return Ok(());
    }

    println!("╔══════════════════════════════╦════════════╦══════════════╦════════════════════╗");
    println!("║ Test                         ║ Language   ║ Generator    ║ Measurements       ║");
    println!("╠══════════════════════════════╬════════════╬══════════════╬════════════════════╣");

    for test in &tests {
        let measurements = test.measurement_names().collect::<Vec<_>>().join(",");
        println!(
            "║ {:<28} ║ {:<10} ║ {:<12} ║ {:<18} ║",
            test.name.as_str(),
            test.language,
            test.generator,
            if measurements.is_empty() { "-" } else { measurements.as_str() }
        );
    }

    println!("╚══════════════════════════════╩════════════╩══════════════╩════════════════════╝");
    println!();
    println!("Total: {} test(s)", tests.len());

    Ok(())
}
