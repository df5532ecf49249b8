//! archsheet CLI
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use archsheet::error::ModifyError;
use archsheet::telemetry::init_logging;
use archsheet::{CancelFlag, ModifyRequest, PipelineConfig, SheetError, SheetService, Strictness, ToggleValue, ViewType};

/// Consistent architectural view sheets with drift-checked edits
#[derive(Debug, Parser)]
#[command(name = "archsheet", version, long_about = None)]
struct Cli {
    /// YAML configuration; built-in defaults plus environment otherwise
    #[arg(short, long, global = true, env = "ARCHSHEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a sheet and save it as the next baseline version
    Generate {
        #[arg(long)]
        design: String,

        /// Raw design input as JSON
        #[arg(long, required_unless_present = "brief", conflicts_with = "brief")]
        dna: Option<PathBuf>,

        /// Free-text project brief, turned into a design by the text model
        #[arg(long)]
        brief: Option<PathBuf>,

        /// Views to render; the configured defaults when omitted
        #[arg(long, value_delimiter = ',')]
        views: Vec<ViewType>,
    },

    /// Apply an edit to the latest (or given) baseline
    Modify {
        #[arg(long)]
        design: String,

        /// Baseline version the edit applies to
        #[arg(long, value_name = "N")]
        at_version: Option<u64>,

        #[arg(long = "toggle", value_name = "NAME=VALUE", value_parser = parse_toggle)]
        toggles: Vec<(String, ToggleValue)>,

        #[arg(long)]
        instruction: Option<String>,

        #[arg(long, value_parser = parse_strictness)]
        strictness: Option<Strictness>,

        /// Reference image strength in [0, 1]
        #[arg(long, value_parser = parse_strength)]
        strength: Option<f32>,
    },

    /// Show stored versions and one baseline
    History {
        #[arg(long)]
        design: String,

        #[arg(long, value_name = "N")]
        at_version: Option<u64>,
    },
}

fn parse_toggle(pair: &str) -> Result<(String, ToggleValue), String> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{pair}`"))?;
    let value = match value {
        "true" | "on" => ToggleValue::Bool(true),
        "false" | "off" => ToggleValue::Bool(false),
        other => ToggleValue::Choice(other.to_string()),
    };
    Ok((name.to_string(), value))
}

fn parse_strictness(level: &str) -> Result<Strictness, String> {
    serde_json::from_value(serde_json::Value::String(level.to_lowercase()))
        .map_err(|_| format!("unknown strictness `{level}`"))
}

fn parse_strength(value: &str) -> Result<f32, String> {
    let strength: f32 = value.parse().map_err(|_| format!("`{value}` is not a number"))?;
    if !(0.0..=1.0).contains(&strength) {
        return Err(format!("{strength} is outside [0, 1]"));
    }
    Ok(strength)
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::from_env().context("building default config")?,
    };
    let _log = init_logging(&config.logging.filter, config.logging.log_dir.as_deref());

    let service = SheetService::from_config(&config)
        .await
        .context("initializing sheet service")?;

    // Ctrl-C stops between views; finished views are kept.
    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    let ctx = service.context().with_cancel(cancel);

    match cli.command {
        Command::Generate {
            design,
            dna,
            brief,
            views,
        } => {
            let outcome = match (dna, brief) {
                (Some(path), _) => {
                    let raw: serde_json::Value =
                        serde_json::from_str(&read(&path).await?).context("design file is not JSON")?;
                    service.generate_from_raw(&design, &raw, &views, &ctx).await
                }
                (None, Some(path)) => {
                    let brief = read(&path).await?;
                    service.generate_from_brief(&design, &brief, &views, &ctx).await
                }
                (None, None) => bail!("one of --dna or --brief is required"),
            };

            match outcome {
                Ok(sheet) => {
                    info!("Generated {} views for {}", sheet.views.len(), design);
                    println!("{}", serde_json::to_string_pretty(&sheet)?);
                }
                Err(SheetError::PartialFailure(partial)) => {
                    let done: Vec<ViewType> = partial.completed.iter().map(|v| v.view_type).collect();
                    bail!(
                        "sheet stopped ({}): completed {:?}, still owed {:?}",
                        partial.cause,
                        done,
                        partial.remaining()
                    );
                }
                Err(e) => return Err(e).context("generating sheet"),
            }
        }
        Command::Modify {
            design,
            at_version,
            toggles,
            instruction,
            strictness,
            strength,
        } => {
            let mut request = ModifyRequest::new(&design);
            for (name, value) in toggles {
                request = request.toggle(&name, value);
            }
            if let Some(text) = instruction {
                request = request.instruction(text);
            }
            if let Some(version) = at_version {
                request = request.at_version(version);
            }
            if let Some(level) = strictness {
                request = request.strictness(level);
            }
            request.image_strength = strength;

            match service.modify_sheet(&request, &ctx).await {
                Ok(result) => {
                    info!(
                        "{}: v{} -> v{} after {} attempt(s)",
                        design,
                        result.parent_version,
                        result.new_version(),
                        result.attempts
                    );
                    println!("{}", serde_json::to_string_pretty(&result.artifact)?);
                }
                Err(ModifyError::DriftRejected { view, score, report }) => {
                    eprintln!("{}", serde_json::to_string_pretty(&report)?);
                    bail!("modification rejected: {view} drifted to {score:.3}; baseline unchanged");
                }
                Err(e) => return Err(e).context("modifying sheet"),
            }
        }
        Command::History { design, at_version } => {
            let versions = service.baseline_versions(&design).await?;
            if versions.is_empty() {
                bail!("no baselines stored for `{design}`");
            }
            let artifact = service.load_baseline(&design, at_version).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "design_id": design,
                    "versions": versions,
                    "current": artifact,
                }))?
            );
        }
    }
    Ok(())
}
