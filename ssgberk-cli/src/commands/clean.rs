// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ssgberk clean` command - Remove harness containers and images.

use ssgberk_core::{ConfigLoader, ContainerOrchestrator};

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;
    let orchestrator = ContainerOrchestrator::from_config(&config);

    orchestrator.stop_all().await;
    let removed = orchestrator.clean_images().await;

    println!("✓ Removed {} image(s)", removed);
    Ok(())
}
