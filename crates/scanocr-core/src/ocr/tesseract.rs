//! Tesseract backend rebuilding prose from per-word TSV records.
//!
//! Tesseract runs as a subprocess (`tesseract <image> stdout -l <lang> tsv`).
//! Each TSV row describes one layout element; word rows carry a confidence
//! score. Low-confidence words are dropped and the rest are regrouped by
//! block and paragraph in the order Tesseract reported them.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, trace, warn};

use super::OcrBackend;
use crate::error::OcrError;
use crate::models::config::{BackendKind, TesseractConfig};

/// Language reported when the engine cannot list its languages.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Confidence assigned to rows whose score cannot be parsed.
const UNPARSED_CONFIDENCE: f32 = -1.0;

/// One row of Tesseract's structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct WordRecord {
    pub level: i32,
    pub page_num: i32,
    pub block_num: i32,
    pub par_num: i32,
    pub line_num: i32,
    pub word_num: i32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// Engine confidence; `-1` when absent or unparsable.
    pub confidence: f32,
    pub text: String,
}

/// A local engine producing structured word records.
pub trait RecognitionEngine: Send + Sync {
    /// Recognize `image`, returning one record per layout element.
    fn recognize(&self, image: &RgbImage, language: &str) -> Result<Vec<WordRecord>, OcrError>;

    /// Languages the engine has data for.
    fn languages(&self) -> Result<Vec<String>, OcrError>;

    /// Whether the engine can be run at all.
    fn is_available(&self) -> bool;
}

/// Tesseract invoked through its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    dpi: Option<u32>,
    page_segmentation_mode: Option<u8>,
}

impl TesseractCli {
    /// Create a runner for the given executable.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            dpi: None,
            page_segmentation_mode: None,
        }
    }

    /// Tell Tesseract the resolution the bitmap was rendered at.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    /// Set the `--psm` page segmentation mode.
    pub fn with_page_segmentation_mode(mut self, psm: Option<u8>) -> Self {
        self.page_segmentation_mode = psm;
        self
    }

    fn run(&self, image_path: &Path, language: &str) -> Result<String, OcrError> {
        let mut command = Command::new(&self.binary);
        command.arg(image_path).arg("stdout").args(["-l", language]);
        if let Some(dpi) = self.dpi {
            command.args(["--dpi", &dpi.to_string()]);
        }
        if let Some(psm) = self.page_segmentation_mode {
            command.args(["--psm", &psm.to_string()]);
        }
        command.arg("tsv");

        let output = command.output().map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineFailed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, e: std::io::Error) -> OcrError {
        if e.kind() == std::io::ErrorKind::NotFound {
            OcrError::EngineUnavailable(format!(
                "{} not found (install tesseract-ocr)",
                self.binary
            ))
        } else {
            OcrError::Io(e)
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl RecognitionEngine for TesseractCli {
    fn recognize(&self, image: &RgbImage, language: &str) -> Result<Vec<WordRecord>, OcrError> {
        let temp = tempfile::Builder::new()
            .prefix("scanocr-page-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(temp.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Encode(e.to_string()))?;

        let tsv = self.run(temp.path(), language)?;
        Ok(parse_tsv(&tsv))
    }

    fn languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(OcrError::EngineFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // Older releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push('\n');
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_language_list(&listing))
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Parse Tesseract TSV output.
///
/// The header row and rows with too few columns are skipped. A confidence
/// that cannot be parsed becomes `-1`; the row is kept.
pub fn parse_tsv(tsv: &str) -> Vec<WordRecord> {
    let mut records = Vec::new();

    for (line_no, line) in tsv.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with("level\t") {
            continue;
        }

        let fields: Vec<&str> = line.splitn(12, '\t').collect();
        if fields.len() < 11 {
            trace!("Skipping short TSV row {}: {:?}", line_no, line);
            continue;
        }

        let mut ints = [0i32; 10];
        let mut valid = true;
        for (slot, field) in ints.iter_mut().zip(&fields[..10]) {
            match field.trim().parse() {
                Ok(value) => *slot = value,
                Err(_) => {
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            trace!("Skipping malformed TSV row {}: {:?}", line_no, line);
            continue;
        }

        let confidence = fields[10]
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|c| c.is_finite())
            .unwrap_or(UNPARSED_CONFIDENCE);

        let [level, page_num, block_num, par_num, line_num, word_num, left, top, width, height] = ints;
        records.push(WordRecord {
            level,
            page_num,
            block_num,
            par_num,
            line_num,
            word_num,
            left,
            top,
            width,
            height,
            confidence,
            text: fields.get(11).copied().unwrap_or_default().to_string(),
        });
    }

    records
}

/// Parse `tesseract --list-langs` output.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| !line.starts_with("List of available languages"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(' '))
        .map(str::to_string)
        .collect()
}

/// Rebuild page text from word records.
///
/// Records at or below `min_confidence` are discarded. The rest are grouped
/// by `(block_num, par_num)` in first-seen order; each group's words are
/// joined with spaces and groups are joined with newlines. Groups containing
/// only whitespace are skipped.
pub fn group_words(records: &[WordRecord], min_confidence: f32) -> String {
    let mut index: HashMap<(i32, i32), usize> = HashMap::new();
    let mut groups: Vec<Vec<&str>> = Vec::new();

    for record in records.iter().filter(|r| r.confidence > min_confidence) {
        let slot = *index
            .entry((record.block_num, record.par_num))
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[slot].push(record.text.as_str());
    }

    groups
        .iter()
        .filter(|words| words.iter().any(|w| !w.trim().is_empty()))
        .map(|words| words.join(" ").trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// OCR backend backed by a local [`RecognitionEngine`].
pub struct TesseractBackend {
    engine: Box<dyn RecognitionEngine>,
    config: TesseractConfig,
}

impl TesseractBackend {
    /// Create a backend running the Tesseract CLI.
    ///
    /// `dpi` is passed to Tesseract as a resolution hint.
    pub fn new(config: TesseractConfig, dpi: Option<u32>) -> Self {
        let mut cli = TesseractCli::new(config.binary.clone())
            .with_page_segmentation_mode(config.page_segmentation_mode);
        if let Some(dpi) = dpi {
            cli = cli.with_dpi(dpi);
        }
        Self::with_engine(Box::new(cli), config)
    }

    /// Create a backend around any recognition engine.
    pub fn with_engine(engine: Box<dyn RecognitionEngine>, config: TesseractConfig) -> Self {
        Self { engine, config }
    }

    /// Backend configuration.
    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    /// Raw word records for `image`, without confidence filtering.
    pub fn recognize_words(&self, image: &RgbImage, language: &str) -> Result<Vec<WordRecord>, OcrError> {
        let language = if language.trim().is_empty() {
            self.config.language.as_str()
        } else {
            language
        };
        self.engine.recognize(image, language)
    }

    /// Languages the engine supports, or just the default language if the
    /// list cannot be obtained.
    pub fn available_languages(&self) -> Vec<String> {
        match self.engine.languages() {
            Ok(languages) if !languages.is_empty() => languages,
            Ok(_) => {
                warn!("Tesseract reported no languages, assuming {}", DEFAULT_LANGUAGE);
                vec![DEFAULT_LANGUAGE.to_string()]
            }
            Err(e) => {
                warn!("Failed to list Tesseract languages: {}", e);
                vec![DEFAULT_LANGUAGE.to_string()]
            }
        }
    }

    /// Whether the underlying engine can run.
    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }
}

impl OcrBackend for TesseractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tesseract
    }

    fn extract(&self, image: &RgbImage, language: &str) -> String {
        let start = Instant::now();

        let records = match self.recognize_words(image, language) {
            Ok(records) => records,
            Err(e) => {
                warn!("Tesseract recognition failed: {}", e);
                return String::new();
            }
        };

        let text = group_words(&records, self.config.min_confidence);

        debug!(
            "Tesseract: {} records, {} chars kept",
            records.len(),
            text.len()
        );
        info!(
            "OCR complete: {}x{} image in {}ms",
            image.width(),
            image.height(),
            start.elapsed().as_millis()
        );
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn word(block: i32, par: i32, confidence: f32, text: &str) -> WordRecord {
        WordRecord {
            level: 5,
            page_num: 1,
            block_num: block,
            par_num: par,
            line_num: 1,
            word_num: 1,
            left: 0,
            top: 0,
            width: 10,
            height: 10,
            confidence,
            text: text.to_string(),
        }
    }

    struct FakeEngine {
        records: Result<Vec<WordRecord>, String>,
        languages: Result<Vec<String>, String>,
        seen_language: Arc<Mutex<Option<String>>>,
    }

    impl FakeEngine {
        fn with_records(records: Vec<WordRecord>) -> Self {
            Self {
                records: Ok(records),
                languages: Ok(vec!["eng".to_string(), "chi_sim".to_string()]),
                seen_language: Arc::default(),
            }
        }

        fn failing() -> Self {
            Self {
                records: Err("engine crashed".to_string()),
                languages: Err("no engine".to_string()),
                seen_language: Arc::default(),
            }
        }
    }

    impl RecognitionEngine for FakeEngine {
        fn recognize(&self, _image: &RgbImage, language: &str) -> Result<Vec<WordRecord>, OcrError> {
            *self.seen_language.lock().unwrap() = Some(language.to_string());
            self.records.clone().map_err(OcrError::EngineFailed)
        }

        fn languages(&self) -> Result<Vec<String>, OcrError> {
            self.languages.clone().map_err(OcrError::EngineUnavailable)
        }

        fn is_available(&self) -> bool {
            self.records.is_ok()
        }
    }

    fn backend(engine: FakeEngine) -> TesseractBackend {
        TesseractBackend::with_engine(Box::new(engine), TesseractConfig::default())
    }

    #[test]
    fn test_parse_tsv() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t100\t120\t80\t30\t96.5\tInvoice\n\
                   5\t1\t1\t1\t1\t2\t190\t120\t40\t30\tabc\tNo.\n\
                   5\t1\t1\t1\t1\t3\t240\t120\t40\t30\t91";

        let records = parse_tsv(tsv);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].text, "");
        assert_eq!(records[1].text, "Invoice");
        assert_eq!(records[1].confidence, 96.5);
        assert_eq!((records[1].left, records[1].top), (100, 120));
        assert_eq!(records[2].confidence, -1.0);
        assert_eq!(records[3].text, "");
    }

    #[test]
    fn test_parse_tsv_skips_malformed_rows() {
        let tsv = "5\t1\t1\n5\tx\t1\t1\t1\t1\t0\t0\t1\t1\t90\tbad\r\n5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t90\tgood\r\n";
        let records = parse_tsv(tsv);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "good");
    }

    #[test]
    fn test_parse_tsv_keeps_tabs_in_text() {
        let records = parse_tsv("5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t90\ta\tb");
        assert_eq!(records[0].text, "a\tb");
    }

    #[test]
    fn test_group_words_threshold_is_exclusive() {
        let records = vec![
            word(1, 1, 60.0, "sixty"),
            word(1, 1, 60.01, "kept"),
            word(1, 1, -1.0, "unparsed"),
            word(1, 1, 95.0, "word"),
        ];
        assert_eq!(group_words(&records, 60.0), "kept word");
    }

    #[test]
    fn test_group_words_all_below_threshold() {
        let records = vec![word(1, 1, 10.0, "faint"), word(2, 1, 59.9, "smudge")];
        assert_eq!(group_words(&records, 60.0), "");
    }

    #[test]
    fn test_group_words_first_seen_order() {
        let records = vec![
            word(2, 1, 90.0, "second-block"),
            word(1, 1, 90.0, "first-block"),
            word(2, 1, 90.0, "continues"),
            word(1, 2, 90.0, "new-paragraph"),
        ];
        let text = group_words(&records, 60.0);
        assert_eq!(text, "second-block continues\nfirst-block\nnew-paragraph");
        assert_eq!(group_words(&records, 60.0), text);
    }

    #[test]
    fn test_group_words_skips_blank_groups() {
        let records = vec![
            word(1, 1, 90.0, "  "),
            word(1, 1, 90.0, ""),
            word(2, 1, 90.0, " Total: "),
            word(2, 1, 90.0, "$50 "),
        ];
        assert_eq!(group_words(&records, 60.0), "Total:  $50");
    }

    #[test]
    fn test_group_words_custom_threshold() {
        let records = vec![word(1, 1, 40.0, "low"), word(1, 1, 80.0, "high")];
        assert_eq!(group_words(&records, 30.0), "low high");
        assert_eq!(group_words(&records, 80.0), "");
    }

    #[test]
    fn test_extract_reconstructs_invoice() {
        let engine = FakeEngine::with_records(vec![
            word(1, 1, 95.0, "Invoice"),
            word(1, 1, 93.0, "No."),
            word(1, 1, 91.0, "123"),
            word(1, 1, 20.0, "~~"),
            word(3, 1, 88.0, "Total:"),
            word(3, 1, 87.0, "$50"),
        ]);
        let image = RgbImage::new(10, 10);
        assert_eq!(backend(engine).extract(&image, "eng"), "Invoice No. 123\nTotal: $50");
    }

    #[test]
    fn test_extract_engine_failure_yields_empty() {
        let image = RgbImage::new(10, 10);
        assert_eq!(backend(FakeEngine::failing()).extract(&image, "eng"), "");
    }

    #[test]
    fn test_blank_language_uses_configured_default() {
        let engine = FakeEngine::with_records(Vec::new());
        let seen = Arc::clone(&engine.seen_language);
        let backend = TesseractBackend::with_engine(
            Box::new(engine),
            TesseractConfig {
                language: "deu".to_string(),
                ..TesseractConfig::default()
            },
        );
        let image = RgbImage::new(4, 4);
        backend.recognize_words(&image, " ").unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("deu"));

        backend.recognize_words(&image, "eng+chi_sim").unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("eng+chi_sim"));
    }

    #[test]
    fn test_available_languages() {
        assert_eq!(
            backend(FakeEngine::with_records(Vec::new())).available_languages(),
            vec!["eng", "chi_sim"]
        );
    }

    #[test]
    fn test_available_languages_fallback() {
        assert_eq!(backend(FakeEngine::failing()).available_languages(), vec!["eng"]);
    }

    #[test]
    fn test_parse_language_list() {
        let listing = "List of available languages in \"/usr/share/tesseract-ocr/5/tessdata/\" (3):\n\
                       chi_sim\neng\nosd\n";
        assert_eq!(parse_language_list(listing), vec!["chi_sim", "eng", "osd"]);
        assert!(parse_language_list("Error opening data file").is_empty());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let cli = TesseractCli::new("scanocr-no-such-tesseract");
        assert!(!cli.is_available());
        let image = RgbImage::new(4, 4);
        assert!(matches!(
            cli.recognize(&image, "eng"),
            Err(OcrError::EngineUnavailable(_))
        ));
    }
}
