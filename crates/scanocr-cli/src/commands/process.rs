//! Process commands - extract text from a single PDF.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use super::{build_extractor, build_markdown, load_config, render_document, EngineArgs, OutputFormat};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Structure Markdown output with the configured vision model (markdown format only)
    #[arg(long)]
    ai: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

/// Arguments for the page command.
#[derive(Args)]
pub struct PageArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Page number (1-based)
    #[arg(required = true, value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,
}

/// Arguments for the blocks command.
#[derive(Args)]
pub struct BlocksArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Only this page (1-based)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    page: Option<u32>,

    /// Emit positioned elements with bounding boxes in PDF points
    #[arg(long)]
    elements: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    check_input(&args.input)?;

    let mut config = load_config(config_path)?;
    args.engine.apply(&mut config);
    let language = args.engine.language(&config);
    info!("Processing file: {} (backend: {})", args.input.display(), config.backend);

    let pb = spinner("Extracting text...");
    let input = args.input.clone();
    let format = args.format;
    let use_model = args.ai && format == OutputFormat::Markdown;
    let output = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let extractor = build_extractor(&config)?;
        let markdown = build_markdown(&config, use_model)?;
        render_document(&extractor, &markdown, &input, &language, format)
    })
    .await?;
    pb.finish_and_clear();

    write_output(args.output.as_deref(), &output?)?;
    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

pub async fn run_page(args: PageArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    check_input(&args.input)?;

    let mut config = load_config(config_path)?;
    args.engine.apply(&mut config);
    let language = args.engine.language(&config);

    let pb = spinner(&format!("Extracting page {}...", args.page));
    let input = args.input.clone();
    let page_index = args.page - 1;
    let text = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let extractor = build_extractor(&config)?;
        Ok(extractor.process_single_page(&input, page_index, &language))
    })
    .await??;
    pb.finish_and_clear();

    write_output(args.output.as_deref(), &text)
}

pub async fn run_blocks(args: BlocksArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    check_input(&args.input)?;

    let mut config = load_config(config_path)?;
    args.engine.apply(&mut config);
    let language = args.engine.language(&config);

    let pb = spinner("Extracting blocks...");
    let input = args.input.clone();
    let page = args.page;
    let elements = args.elements;
    let json = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let extractor = build_extractor(&config)?;
        let json = match (page, elements) {
            (Some(page), false) => serde_json::to_string_pretty(&extractor.page_blocks(&input, page - 1, &language))?,
            (None, false) => serde_json::to_string_pretty(&extractor.process_blocks(&input, &language)?)?,
            (Some(page), true) => serde_json::to_string_pretty(&extractor.page_elements(&input, page - 1, &language))?,
            (None, true) => serde_json::to_string_pretty(&extractor.process_elements(&input, &language)?)?,
        };
        Ok(json)
    })
    .await??;
    pb.finish_and_clear();

    write_output(args.output.as_deref(), &json)
}

fn check_input(input: &Path) -> anyhow::Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content)?;
            println!("{} Output written to {}", style("✓").green(), path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
