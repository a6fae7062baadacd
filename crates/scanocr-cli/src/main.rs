//! CLI application for scanned-PDF text extraction.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, config, languages, process};

/// Scanned PDF OCR - Extract text from image-only PDF documents
#[derive(Parser)]
#[command(name = "scanocr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the text of every page of a PDF
    Process(process::ProcessArgs),

    /// Extract the text of a single page
    Page(process::PageArgs),

    /// Extract paragraph blocks for every page as JSON
    Blocks(process::BlocksArgs),

    /// Process multiple PDF files
    Batch(batch::BatchArgs),

    /// List installed Tesseract languages
    Languages,

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Process(args) => process::run(args, config_path).await,
        Commands::Page(args) => process::run_page(args, config_path).await,
        Commands::Blocks(args) => process::run_blocks(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::Languages => languages::run(config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
