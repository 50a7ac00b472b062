//! A custom task runner for this workspace, invoked via `cargo xtask`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser, Debug)]
#[command(author, version, about = "Development task runner for this workspace.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lints the workspace using `cargo clippy -D warnings`.
    Lint,
    /// Runs all unit and integration tests in the workspace.
    Test,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Lint => lint()?,
        Commands::Test => test()?,
    }

    Ok(())
}

fn lint() -> Result<()> {
    println!("▶️  Running 'cargo clippy' with -D warnings...");
    let project_root = get_project_root()?;
    let status = Command::new("cargo")
        .current_dir(&project_root)
        .arg("clippy")
        .arg("--workspace")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .status()
        .context("failed to run cargo clippy")?;

    if !status.success() {
        anyhow::bail!("clippy found errors.");
    }
    println!("✅ All checks passed.");
    Ok(())
}

fn test() -> Result<()> {
    println!("▶️  Running all tests...");
    let project_root = get_project_root()?;
    let status = Command::new("cargo")
        .current_dir(&project_root)
        .arg("test")
        .arg("--workspace")
        .status()
        .context("failed to run cargo test")?;

    if !status.success() {
        anyhow::bail!("tests failed.");
    }
    println!("✅ All tests passed.");
    Ok(())
}

fn get_project_root() -> Result<PathBuf> {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .context("failed to get project root")
        .map(|p| p.to_path_buf())
}
