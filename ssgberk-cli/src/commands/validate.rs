// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ssgberk validate` command - Validate configuration file.

use std::sync::Arc;

use ssgberk_core::{ConfigLoader, MeasurementRegistry, TestCatalog};

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    let config = match ConfigLoader::load_file(file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let registry = match MeasurementRegistry::standard().select(config.measurement_type.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    let catalog = TestCatalog::new(config.lang_root(), Arc::new(registry));

    println!("✓ Configuration is valid");
    println!();
    println!("Harness Settings:");
    println!("  Root:               {}", config.root.display());
    println!("  Duration:           {}s", config.duration);
    println!("  Network:            {}", config.network.engine_network());
    println!("  Server Engine:      {}", config.server_engine_host());
    println!("  Client Engine:      {}", config.client_engine_host());
    println!("  Image Namespace:    {}", config.image_namespace);
    println!("  Build Timeout:      {}s", config.build_timeout.as_secs());
    println!("  Test Timeout:       {}s", config.run_test_timeout.as_secs());
    println!("  Commit Workers:     {}", config.commit_workers);
    println!(
        "  Measurement Types:  {}",
        catalog.registry().names().collect::<Vec<_>>().join(", ")
    );
    println!();

    match catalog.gather(&[], &[]) {
        Ok(tests) => println!("Tests ({}) under {}", tests.len(), catalog.root().display()),
        Err(e) => println!("Tests: unavailable ({})", e),
    }

    Ok(())
}
