//! Languages command - list installed Tesseract language packs.

use console::style;

use scanocr_core::TesseractBackend;

use super::load_config;

pub async fn run(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let binary = config.tesseract.binary.clone();

    let (available, languages) = tokio::task::spawn_blocking(move || {
        let backend = TesseractBackend::new(config.tesseract, None);
        (backend.is_available(), backend.available_languages())
    })
    .await?;

    if !available {
        println!(
            "{} Tesseract not found ({}); showing the default language only.",
            style("⚠").yellow(),
            binary
        );
    }

    for language in languages {
        println!("{}", language);
    }

    Ok(())
}
