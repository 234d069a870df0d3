use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use boq_core::Quantity;
use boq_index::EnsureOutcome;
use boq_rag::{
    compute_cost, ingest_file, list_cached, prepare_index, query, BoqConfig, CostSummary,
    IngestMode, IngestOptions, MaterialQuery, Services, DEFAULT_CONFIG_FILE,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "boq", version = VERSION, about = "Bill-of-quantities ingest, search and pricing")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,
    #[arg(long = "output-dir", global = true)]
    output_dir: Option<PathBuf>,
    #[arg(long = "prices", global = true)]
    prices: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a CSV/XLS/XLSX bill of quantities into the vector index.
    Ingest {
        file: PathBuf,
        /// Embed whole rows instead of extracting materials from "Description".
        #[arg(long = "no-extract", action = ArgAction::SetTrue)]
        no_extract: bool,
        /// Upsert into the existing index instead of recreating it.
        #[arg(long = "keep-index", action = ArgAction::SetTrue)]
        keep_index: bool,
    },
    /// Find the nearest stored items and price them.
    Query {
        text: String,
        #[arg(long = "top-k")]
        top_k: Option<usize>,
    },
    /// Show everything the last ingest upserted.
    List,
    /// Price materials directly, e.g. --item "copper wire=10".
    Cost {
        #[arg(long = "item", required = true)]
        items: Vec<String>,
    },
    /// Create the index if needed and wait until it is ready.
    EnsureIndex {
        #[arg(long, action = ArgAction::SetTrue)]
        recreate: bool,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose || env_flag("BOQ_VERBOSE"));

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = BoqConfig::load(&config_path)?;
    if let Some(dir) = cli.output_dir.clone() {
        config.output_dir = dir;
    }
    if let Some(prices) = cli.prices.clone() {
        config.price_file = prices;
    }
    debug!(config = %config_path.display(), index = %config.index_name, "configuration loaded");
    let services = Services::from_config(config)?;
    let result = run(&cli, &services);
    services.shutdown();
    result
}

fn run(cli: &Cli, services: &Services) -> Result<()> {
    match &cli.command {
        Commands::Ingest {
            file,
            no_extract,
            keep_index,
        } => {
            let options = IngestOptions {
                mode: if *no_extract {
                    IngestMode::Concatenate
                } else {
                    IngestMode::Extract
                },
                recreate: !keep_index,
            };
            let report = ingest_file(services, file, options)
                .with_context(|| format!("failed to ingest {}", file.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("[BOQ] {}", report.message());
                println!(
                    "[BOQ] Index '{}' {} ({} rows)",
                    services.config.index_name,
                    describe_outcome(report.outcome),
                    report.rows
                );
            }
        }
        Commands::Query { text, top_k } => {
            let top_k = top_k.unwrap_or(services.config.top_k);
            let outcome = query(services, text, top_k)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            println!("{}", outcome.headline());
            for m in outcome.matches.iter().skip(1) {
                println!("  {} ({}) score {:.3}", m.text, m.id, m.score);
            }
            print_summary(&outcome.cost);
            if let Some(path) = &outcome.summary_path {
                println!("[BOQ] Summary written to {}", path.display());
            }
        }
        Commands::List => {
            let records = list_cached(services);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("[BOQ] No cached metadata.");
            }
            for record in &records {
                println!(
                    "{:<40} {:<24} {}",
                    record.text,
                    record.material.as_deref().unwrap_or(""),
                    record
                        .quantity
                        .as_ref()
                        .map(render_quantity)
                        .unwrap_or_default()
                );
            }
        }
        Commands::Cost { items } => {
            let queries = items
                .iter()
                .map(|raw| parse_item(raw))
                .collect::<Result<Vec<_>>>()?;
            let report = compute_cost(services, &queries)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            if report.summary.is_empty() {
                println!("[BOQ] No prices available ({}).", services.config.price_file.display());
            }
            print_summary(&report.summary);
            if let Some(path) = &report.path {
                println!("[BOQ] Summary written to {}", path.display());
            }
        }
        Commands::EnsureIndex { recreate } => {
            let outcome = prepare_index(services, *recreate)?;
            info!(index = %services.config.index_name, ?outcome, "index ensured");
            println!(
                "[BOQ] Index '{}' {}",
                services.config.index_name,
                describe_outcome(outcome)
            );
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// `material=quantity`; the last `=` splits, so material names may contain one.
fn parse_item(raw: &str) -> Result<MaterialQuery> {
    let (material, quantity) = raw
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("expected MATERIAL=QTY, got '{raw}'"))?;
    let material = material.trim();
    if material.is_empty() {
        return Err(anyhow!("missing material name in '{raw}'"));
    }
    let quantity = match quantity.trim().parse::<f64>() {
        Ok(value) => Quantity::Number(value),
        Err(_) => Quantity::Text(quantity.trim().to_string()),
    };
    Ok(MaterialQuery::new(material, quantity))
}

fn render_quantity(quantity: &Quantity) -> String {
    match quantity {
        Quantity::Number(value) => value.to_string(),
        Quantity::Text(text) => text.clone(),
    }
}

fn describe_outcome(outcome: EnsureOutcome) -> &'static str {
    match outcome {
        EnsureOutcome::Existing => "already existed",
        EnsureOutcome::Created => "created",
        EnsureOutcome::Recreated => "recreated",
    }
}

fn print_summary(summary: &CostSummary) {
    if summary.is_empty() {
        return;
    }
    println!(
        "{:<28} {:>10} {:>12} {:>8} {:>12}",
        "Raw Material", "Quantity", "Unit Price", "Disc %", "Total"
    );
    for line in &summary.lines {
        let marker = if line.matched { "" } else { "  (no price)" };
        println!(
            "{:<28} {:>10} {:>12.2} {:>8} {:>12.2}{marker}",
            line.material, line.quantity, line.unit_price, line.discount_percent, line.total
        );
    }
    println!("{:<28} {:>10} {:>12} {:>8} {:>12.2}", "GRAND TOTAL", "", "", "", summary.grand_total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_material_quantity_pairs() {
        let item = parse_item(" copper wire = 10 ").unwrap();
        assert_eq!(item.material, "copper wire");
        assert_eq!(item.quantity, Quantity::Number(10.0));

        let item = parse_item("pipe a=b=3").unwrap();
        assert_eq!(item.material, "pipe a=b");

        let item = parse_item("cement=lots").unwrap();
        assert_eq!(item.quantity, Quantity::Text("lots".into()));

        assert!(parse_item("no separator").is_err());
        assert!(parse_item("=4").is_err());
    }

    #[test]
    fn cli_shape_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn ingest_flags_parse() {
        let cli = Cli::try_parse_from(["boq", "ingest", "boq.xlsx", "--keep-index", "--no-extract"])
            .unwrap();
        match cli.command {
            Commands::Ingest {
                no_extract,
                keep_index,
                ..
            } => assert!(no_extract && keep_index),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
