//! Batch processing command for multiple PDF files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use scanocr_core::{MarkdownGenerator, PageTextExtractor};

use super::{build_extractor, build_markdown, load_config, render_document, EngineArgs, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Structure Markdown output with the configured vision model (markdown format only)
    #[arg(long)]
    ai: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    output: Option<PathBuf>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.engine.apply(&mut config);
    let language = args.engine.language(&config);

    let files = expand_pattern(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!("{} Found {} files to process", style("ℹ").blue(), files.len());

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let outputs = output_paths(&files, args.output_dir.as_deref(), args.format);
    let format = args.format;
    let use_model = args.ai && format == OutputFormat::Markdown;
    let continue_on_error = args.continue_on_error;
    let results = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<ProcessResult>> {
        let extractor = build_extractor(&config)?;
        let markdown = build_markdown(&config, use_model)?;
        let jobs = Jobs {
            extractor: &extractor,
            markdown: &markdown,
            language: &language,
            format,
        };
        process_files(&jobs, &files, &outputs, continue_on_error)
    })
    .await??;

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let successful = results.len() - failed.len();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Shared settings for every file in a batch.
struct Jobs<'a> {
    extractor: &'a PageTextExtractor,
    markdown: &'a MarkdownGenerator,
    language: &'a str,
    format: OutputFormat,
}

/// Expand a glob pattern into the PDF files it matches, sorted.
///
/// Entries the glob walk cannot read are logged and skipped.
fn expand_pattern(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob(pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path {}: {}", e.path().display(), e.error());
                None
            }
        })
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn process_files(
    jobs: &Jobs<'_>,
    files: &[PathBuf],
    outputs: &[PathBuf],
    continue_on_error: bool,
) -> anyhow::Result<Vec<ProcessResult>> {
    let pb = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
    {
        pb.set_style(style.progress_chars("=>-"));
    }

    let mut results = Vec::with_capacity(files.len());
    for (path, output_path) in files.iter().zip(outputs) {
        let file_start = Instant::now();
        let result = process_single_file(jobs, path, output_path);
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                debug!("Wrote output to {}", output.display());
                results.push(ProcessResult {
                    path: path.clone(),
                    output: Some(output),
                    error: None,
                    processing_time_ms,
                });
            }
            Err(e) => {
                let error_msg = e.to_string();
                if continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(ProcessResult {
                        path: path.clone(),
                        output: None,
                        error: Some(error_msg),
                        processing_time_ms,
                    });
                } else {
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    pb.abandon();
                    anyhow::bail!("Processing failed: {}", error_msg);
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    for result in &results {
        if let Some(output) = &result.output {
            debug!(
                "{} -> {} ({}ms)",
                result.path.display(),
                output.display(),
                result.processing_time_ms
            );
        }
    }

    Ok(results)
}

fn process_single_file(jobs: &Jobs<'_>, path: &Path, output_path: &Path) -> anyhow::Result<PathBuf> {
    let rendered = render_document(jobs.extractor, jobs.markdown, path, jobs.language, jobs.format)?;
    fs::write(output_path, rendered)?;
    Ok(output_path.to_path_buf())
}

/// `<stem>.<ext>` in the output directory, or next to the input.
fn output_path(input: &Path, output_dir: Option<&Path>, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}.{}", stem, format.extension()))
}

/// One output path per input. Inputs from different directories that share
/// a stem get `-2`, `-3`, ... suffixes instead of overwriting each other.
fn output_paths(files: &[PathBuf], output_dir: Option<&Path>, format: OutputFormat) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    files
        .iter()
        .map(|input| {
            let base = output_path(input, output_dir, format);
            let mut candidate = base.clone();
            let mut n = 2;
            while !taken.insert(candidate.clone()) {
                let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
                candidate = base.with_file_name(format!("{}-{}.{}", stem, n, format.extension()));
                n += 1;
            }
            candidate
        })
        .collect()
}
