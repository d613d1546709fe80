// Price Catalog Importer - CLI
// price-catalog [-c CONFIG] [-o OUTPUT] [-v...] <alltron|mitel|suprag|all|list-enc>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

use price_catalog::export::resolve_encoding;
use price_catalog::{
    logging, sources, AlltronSource, Config, Export, MitelSource, Pipeline, SourceAdapter,
    SupragSource, ENCODINGS,
};

/// Import vendor price lists into one priced catalog
#[derive(Parser)]
#[command(name = "price-catalog", version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON when it ends in .json)
    #[arg(short, long, default_value = "price-catalog.toml", global = true)]
    config: PathBuf,

    /// Output file, overrides `output_file` from the configuration
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join the Alltron article and price XML files
    Alltron {
        /// Article file, overrides `article_file`
        #[arg(requires = "prices")]
        articles: Option<String>,
        /// Price file, overrides `price_file`
        prices: Option<String>,
    },
    /// Import the Mitel price list workbook
    Mitel {
        /// Workbook, overrides `file`
        file: Option<String>,
    },
    /// Import the Suprag price list
    Suprag {
        /// Price list, overrides `file`
        file: Option<String>,
    },
    /// Run every source configured
    All,
    /// List the supported output encodings
    ListEnc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Command::ListEnc = cli.command {
        for encoding in ENCODINGS {
            println!("{}", encoding);
        }
        return Ok(());
    }

    let config = Config::from_file(&cli.config)?;
    let success = run_import(&cli, config)?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Select the sources for the command, applying location overrides
fn select_sources(command: &Command, config: &mut Config) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let selected: Vec<Box<dyn SourceAdapter>> = match command {
        Command::Alltron { articles, prices } => {
            let section = config
                .alltron
                .as_mut()
                .context("Config has no [alltron] section")?;
            if let (Some(articles), Some(prices)) = (articles, prices) {
                section.article_file = articles.clone();
                section.price_file = prices.clone();
            }
            vec![Box::new(AlltronSource::new(section.clone()))]
        }
        Command::Mitel { file } => {
            let section = config.mitel.as_mut().context("Config has no [mitel] section")?;
            if let Some(file) = file {
                section.file = file.clone();
            }
            vec![Box::new(MitelSource::new(section.clone()))]
        }
        Command::Suprag { file } => {
            let section = config.suprag.as_mut().context("Config has no [suprag] section")?;
            if let Some(file) = file {
                section.file = file.clone();
            }
            vec![Box::new(SupragSource::new(section.clone()))]
        }
        Command::All => sources::from_config(config),
        Command::ListEnc => Vec::new(),
    };

    if selected.is_empty() {
        anyhow::bail!("No sources configured");
    }
    Ok(selected)
}

fn run_import(cli: &Cli, mut config: Config) -> Result<bool> {
    let selected = select_sources(&cli.command, &mut config)?;
    let output = cli.output.clone().unwrap_or_else(|| config.output_file.clone());

    // Configuration errors must surface before the output file is touched
    resolve_encoding(&config.output_encoding)?;
    let mut pipeline = Pipeline::new(selected);
    pipeline.init_all()?;

    let file = File::create(&output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    let mut export = Export::new(file, &config.output_encoding)?;

    info!(output = %output.display(), sources = pipeline.len(), "importing");
    let report = pipeline.run(&mut export);
    let written = export.written();
    export.into_inner()?;

    println!("{}", report);
    println!("📄 {} records written to {}", written, output.display());

    if !report.is_success() {
        let failed: Vec<&str> = report.failed_sources().collect();
        eprintln!("❌ Failed sources: {}", failed.join(", "));
    }
    Ok(report.is_success())
}
