//! Flowwright CLI - batch flow assembly

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use flowwright::ast::BatchRequest;
use flowwright::client::NifiClient;
use flowwright::config::FlowConfig;
use flowwright::error::{FixSuggestion, FlowError};
use flowwright::preflight::intra_batch;
use flowwright::runtime::{Assembler, FlowResponse, InvocationContext, Status};
use flowwright::schema::{check_expression, schema_for};

/// Scope name used when validating offline without one
const OFFLINE_SCOPE: &str = "(offline)";

#[derive(Parser)]
#[command(name = "flowwright")]
#[command(about = "Flowwright - assemble flows on a NiFi-style platform")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/flowwright/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every definition of a batch file in one scope
    Apply {
        /// Path to a YAML or JSON batch file
        file: PathBuf,

        /// Target scope id (overrides targetScope and the configured default)
        #[arg(short, long)]
        scope: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check a batch file offline: definitions, names and expressions
    Validate {
        /// Path to a YAML or JSON batch file
        file: PathBuf,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (password masked)
    Show,
    /// Print the config file location
    Path,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Apply {
            file,
            scope,
            format,
        } => apply(cli.config.as_deref(), &file, scope.as_deref(), format).await,
        Commands::Validate { file } => validate(&file),
        Commands::Config { action } => show_config(cli.config.as_deref(), action),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.downcast_ref::<FlowError>().and_then(|f| f.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<FlowConfig> {
    let config = match path {
        Some(path) => FlowConfig::load_from(path)?,
        None => FlowConfig::load()?,
    };
    Ok(config.with_env())
}

async fn apply(
    config_path: Option<&Path>,
    file: &Path,
    scope: Option<&str>,
    format: OutputFormat,
) -> Result<bool> {
    let config = load_config(config_path)?;
    let batch = load_batch(file)?.into_batch(scope, config.assembly.default_scope.as_deref())?;

    let client = NifiClient::new(&config.server).context("Failed to build the platform client")?;
    let ctx = InvocationContext::new(Arc::new(client), config.assembly.clone());
    if format == OutputFormat::Text {
        println!(
            "{} Assembling {} definitions into scope {} ({})",
            "→".cyan(),
            batch.len(),
            batch.scope.cyan().bold(),
            config.server.base_url
        );
    }

    let response = Assembler::new(ctx).assemble(batch).await;
    match format {
        OutputFormat::Json => println!("{}", response.to_json()),
        OutputFormat::Text => print_response(&response),
    }
    Ok(response.status != Status::Error)
}

fn print_response(response: &FlowResponse) {
    let status = match response.status {
        Status::Success => "success".green().bold(),
        Status::Warning => "warning".yellow().bold(),
        Status::Error => "error".red().bold(),
    };
    println!("{} {}", status, response.message);

    let s = &response.summary;
    println!(
        "  Services: {} created, {} enabled | Units: {} | Links: {} | Errors: {} | Warnings: {}",
        s.services_created, s.services_enabled, s.units_created, s.links_created, s.total_errors,
        s.total_warnings
    );

    for result in &response.detailed_results {
        let marker = match result.status {
            Status::Success => "✓".green(),
            Status::Warning => "!".yellow(),
            Status::Error => "✗".red(),
        };
        println!("  {} {}", marker, result.message);
        for warning in &result.warnings {
            println!("      {} {}", "warn:".yellow(), warning);
        }
        for error in &result.errors {
            println!("      {} {}", "error:".red(), error);
        }
    }

    for issue in &response.validation.issues {
        println!("  {} {}", "review:".cyan(), issue.message);
    }
    if let Some(rollback) = &response.rollback {
        println!(
            "  {} {} deleted, {} failed, {} kept (pre-existing)",
            "rollback:".magenta(),
            rollback.successful_deletions,
            rollback.failed_deletions,
            rollback.skipped_preexisting
        );
    }
}

fn load_batch(file: &Path) -> Result<BatchRequest> {
    BatchRequest::from_file(file).with_context(|| format!("Failed to load batch '{}'", file.display()))
}

fn validate(file: &Path) -> Result<bool> {
    let batch = load_batch(file)?.into_batch(None, Some(OFFLINE_SCOPE))?;

    let mut problems: Vec<String> = batch.definition_errors().iter().map(|e| e.error.to_string()).collect();
    problems.extend(intra_batch(&batch).into_iter().map(|f| f.message));

    let mut notes = Vec::new();
    for unit in &batch.units {
        let schema = schema_for(&unit.type_name);
        for (property, value) in &unit.properties {
            let Some(result) = check_expression(schema, property, value) else {
                continue;
            };
            for error in result.errors {
                problems.push(format!("{} / {}: {}", unit.name, property, error));
            }
            if result.changed {
                notes.push(format!("{} / {}: {} -> {}", unit.name, property, value, result.value));
            }
        }
    }

    for note in &notes {
        println!("  {} {}", "would correct:".yellow(), note);
    }
    if problems.is_empty() {
        println!("{} Batch '{}' is valid", "✓".green(), file.display());
        println!("  Services: {}", batch.services.len());
        println!("  Units: {}", batch.units.len());
        println!("  Links: {}", batch.links.len());
        return Ok(true);
    }

    for problem in &problems {
        eprintln!("  {} {}", "✗".red(), problem);
    }
    eprintln!("{} {} problems found", "Error:".red().bold(), problems.len());
    Ok(false)
}

fn show_config(path: Option<&Path>, action: ConfigAction) -> Result<bool> {
    match action {
        ConfigAction::Path => {
            let path = path.map(Path::to_path_buf).unwrap_or_else(FlowConfig::config_path);
            println!("{}", path.display());
        }
        ConfigAction::Show => print!("{}", load_config(path)?.display()),
    }
    Ok(true)
}
