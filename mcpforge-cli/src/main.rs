use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcpforge_core::config::ForgeConfig;
use mcpforge_core::events::GenerationEvent;
use mcpforge_core::model::GenerationRequest;
use mcpforge_core::orchestrator;

/// Generate a Model Context Protocol server from an OpenAPI document.
#[derive(Parser, Debug)]
#[command(name = "mcpforge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Validator against a spec and print the report.
    Validate {
        source: String,
    },
    /// Load, validate, and map a spec, printing the Tool list as JSON.
    Tools {
        source: String,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Run a full generation job to completion, printing progress.
    Generate {
        source: String,
        #[arg(long = "out")]
        output_dir: String,
        #[arg(long = "package-name")]
        package_name: String,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        overwrite: bool,
        #[arg(long, default_value = "cli")]
        project_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ForgeConfig::from_env();

    match cli.command {
        Commands::Validate { source } => {
            let report = mcpforge_core::validate_spec(&source, &config)
                .await
                .context("validation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
        Commands::Tools { source, base_url } => {
            let (handle, report) = mcpforge_core::load_spec(&source, &config)
                .await
                .context("failed to load spec")?;
            if !report.valid {
                eprintln!("spec failed validation; see `mcpforge validate` for details");
                std::process::exit(1);
            }
            let tools = mcpforge_core::map_operations(&handle, base_url.as_deref());
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        Commands::Generate {
            source,
            output_dir,
            package_name,
            base_url,
            overwrite,
            project_id,
        } => {
            let request = GenerationRequest {
                project_id,
                source,
                output_dir,
                package_name,
                base_url,
                overwrite,
                template_set_id: None,
            };
            let (job_id, mut events) =
                orchestrator::start_generation(request, config).context("failed to start generation")?;
            println!("▶ job {job_id} started");

            loop {
                match events.recv().await {
                    Ok(GenerationEvent::Started { .. }) => {}
                    Ok(GenerationEvent::Progress { step, fraction, .. }) => {
                        println!("… {step} ({:.0}%)", fraction * 100.0);
                    }
                    Ok(GenerationEvent::Completed { output, .. }) => {
                        println!("✅ generated {} files into {}", output.files.len(), output.target_dir);
                        break;
                    }
                    Ok(GenerationEvent::Failed { error, .. }) => {
                        eprintln!("✗ generation failed: [{}] {}", error.code, error.message);
                        std::process::exit(1);
                    }
                    Ok(GenerationEvent::Cancelled { .. }) => {
                        eprintln!("generation cancelled");
                        std::process::exit(1);
                    }
                    Err(_) => break,
                }
            }
        }
    }

    Ok(())
}
