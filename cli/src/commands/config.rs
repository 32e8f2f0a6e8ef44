// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use overwatch_core::domain::overwatch_config::OverwatchConfigManifest;

const ANNOTATED_TEMPLATE: &str = include_str!("../../templates/overwatch-config.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./overwatch-config.yaml)
        #[arg(short, long, default_value = "./overwatch-config.yaml")]
        output: PathBuf,

        /// Write the annotated template with every section filled in
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = OverwatchConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. OVERWATCH_CONFIG_PATH: {}",
            std::env::var("OVERWATCH_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./overwatch-config.yaml");
        println!("  4. ~/.overwatch/config.yaml");
        println!("  5. /etc/overwatch/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Kill switch:".bold());
    println!("  Detection policy: {:?}", spec.kill_switch.detection_policy);
    println!("  Action timeout: {:?}", spec.kill_switch.action_timeout);
    println!("  Run deadline: {:?}", spec.kill_switch.run_deadline);
    println!("  Reconcile on startup: {}", spec.kill_switch.reconcile_on_startup);
    println!();

    println!("{}", "Control planes:".bold());
    match &spec.compute {
        Some(c) if c.enabled => println!("  Compute: {}", c.endpoint),
        _ => println!("  Compute: {}", "(not configured)".yellow()),
    }
    match &spec.session {
        Some(s) if s.enabled => println!("  Session: {} (identity prefix '{}')", s.endpoint, s.identity_prefix),
        _ => println!("  Session: {}", "(not configured)".yellow()),
    }
    match &spec.notification {
        Some(n) if n.enabled => println!("  Notification: {}", n.endpoint),
        _ => println!("  Notification: {}", "(disabled)".dimmed()),
    }
    println!();

    println!("{}", "Storage:".bold());
    println!("  Backend: {:?}", spec.storage.backend);
    println!();

    println!("{}", "Network:".bold());
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = OverwatchConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    if with_examples {
        std::fs::write(&output, ANNOTATED_TEMPLATE)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    } else {
        OverwatchConfigManifest::default()
            .to_yaml_file(&output)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    }

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}
