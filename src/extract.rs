//! Per-format text extraction.
//!
//! Sources hand over raw bytes plus a file name; the extension selects a
//! [`DocumentFormat`] and [`FormatExtractor`] turns the bytes into plain
//! UTF-8 text. Extraction never panics: unreadable input is an
//! [`ExtractError`] and the caller skips the source.
//!
//! | Format | Extensions | Method |
//! |--------|------------|--------|
//! | PDF | `pdf` | `pdf-extract` |
//! | Word | `docx` | `word/document.xml` text runs |
//! | Legacy Word | `doc` | OOXML if it is one, else UTF-16LE ASCII scan |
//! | Spreadsheet | `xlsx` | shared strings + inline values per sheet |
//! | Legacy spreadsheet | `xls` | BIFF workbook via `calamine` |
//! | CSV | `csv` | verbatim |
//! | Image | `png`, `jpg`, `jpeg`, `tif`, `tiff` | external OCR command |
//! | Slide deck | `pptx` | `ppt/slides/slideN.xml` text runs |
//! | Legacy slides | `ppt` | printable ASCII scan |
//! | Plain text | `txt`, `md` | lossy UTF-8 |

use std::io::{Read, Write};
use std::process::{Command, Stdio};

use thiserror::Error;

/// Maximum sheets to process in a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("XLS extraction failed: {0}")]
    Xls(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// Closed set of formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    LegacyDoc,
    Spreadsheet,
    LegacySpreadsheet,
    Csv,
    Image,
    SlideDeck,
    LegacyPpt,
    PlainText,
}

impl DocumentFormat {
    /// Detect the format from a file or blob name's extension.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = extension(name)?;
        let format = match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "doc" => Self::LegacyDoc,
            "xlsx" => Self::Spreadsheet,
            "xls" => Self::LegacySpreadsheet,
            "csv" => Self::Csv,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Self::Image,
            "pptx" => Self::SlideDeck,
            "ppt" => Self::LegacyPpt,
            "txt" | "md" => Self::PlainText,
            _ => return None,
        };
        Some(format)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::LegacyDoc => "doc",
            Self::Spreadsheet => "spreadsheet",
            Self::LegacySpreadsheet => "xls",
            Self::Csv => "csv",
            Self::Image => "image",
            Self::SlideDeck => "pptx",
            Self::LegacyPpt => "ppt",
            Self::PlainText => "text",
        }
    }
}

/// Lower-cased extension of `name`, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let base = docqa_core::catalog::base_name(name);
    match base.rfind('.') {
        Some(i) if i + 1 < base.len() => Some(base[i + 1..].to_lowercase()),
        _ => None,
    }
}

/// Bytes-to-text capability used by the corpus builder and the
/// preparation pass.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, name: &str, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Default extractor dispatching on [`DocumentFormat`].
#[derive(Debug, Clone)]
pub struct FormatExtractor {
    ocr_command: String,
    ocr_language: String,
}

impl Default for FormatExtractor {
    fn default() -> Self {
        Self {
            ocr_command: "tesseract".to_string(),
            ocr_language: "fra".to_string(),
        }
    }
}

impl FormatExtractor {
    pub fn new(ocr_command: impl Into<String>, ocr_language: impl Into<String>) -> Self {
        Self {
            ocr_command: ocr_command.into(),
            ocr_language: ocr_language.into(),
        }
    }

    pub fn from_config(config: &crate::config::ExtractionConfig) -> Self {
        Self::new(&config.ocr_command, &config.ocr_language)
    }

    fn ocr(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut child = Command::new(&self.ocr_command)
            .args(["stdin", "stdout", "-l", &self.ocr_language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractError::Ocr(format!("cannot run {}: {e}", self.ocr_command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(bytes)
                .map_err(|e| ExtractError::Ocr(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| ExtractError::Ocr(e.to_string()))?;
        if !output.status.success() {
            return Err(ExtractError::Ocr(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TextExtractor for FormatExtractor {
    fn extract(&self, name: &str, bytes: &[u8]) -> Result<String, ExtractError> {
        let format = DocumentFormat::from_name(name)
            .ok_or_else(|| ExtractError::Unsupported(extension(name).unwrap_or_default()))?;

        let text = match format {
            DocumentFormat::Pdf => extract_pdf(bytes)?,
            DocumentFormat::Docx => extract_docx(bytes)?,
            DocumentFormat::LegacyDoc => match extract_docx(bytes) {
                Ok(text) => text,
                Err(_) => scan_utf16_ascii(bytes),
            },
            DocumentFormat::Spreadsheet => extract_xlsx(bytes)?,
            DocumentFormat::LegacySpreadsheet => extract_xls(bytes)?,
            DocumentFormat::Csv | DocumentFormat::PlainText => decode_text(bytes),
            DocumentFormat::Image => self.ocr(bytes)?,
            DocumentFormat::SlideDeck => extract_pptx(bytes)?,
            DocumentFormat::LegacyPpt => scan_ascii(bytes),
        };
        Ok(text.trim().to_string())
    }
}

/// Lossy UTF-8 decode that drops undecodable bytes instead of replacing them.
fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}

/// Printable ASCII stored as UTF-16LE code units (legacy Word binaries).
fn scan_utf16_ascii(bytes: &[u8]) -> String {
    let text: String = bytes
        .chunks_exact(2)
        .filter(|pair| (0x20..=0x7e).contains(&pair[0]) && pair[1] == 0)
        .map(|pair| pair[0] as char)
        .collect();
    collapse_whitespace(&text)
}

/// Printable ASCII bytes (legacy PowerPoint binaries).
fn scan_ascii(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|b| (0x20..=0x7e).contains(*b))
        .map(|&b| b as char)
        .collect();
    collapse_whitespace(&text)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed files.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {name} exceeds size limit ({MAX_XML_ENTRY_BYTES} bytes)"
        )));
    }
    Ok(out)
}

/// Entries `{prefix}N.xml` sorted by `N`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    text_runs_by_paragraph(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = text_runs_by_paragraph(&xml)?;
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

/// Concatenate `<*:t>` text runs, one line per `<*:p>` paragraph. Works for
/// both WordprocessingML and DrawingML.
fn text_runs_by_paragraph(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                line.push_str(&te.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                    line.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !line.trim().is_empty() {
        lines.push(line.trim().to_string());
    }
    Ok(lines.join("\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for (i, name) in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
        .enumerate()
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let rows = sheet_rows(&xml, &shared_strings)?;
        if rows.is_empty() {
            continue;
        }
        sheets.push(format!("Sheet: {}\n{}", i + 1, rows.join("\n")));
    }
    Ok(sheets.join("\n\n"))
}

fn extract_xls(bytes: &[u8]) -> Result<String, ExtractError> {
    use calamine::{Reader, Xls};

    let mut workbook: Xls<_> = Xls::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Xls(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().into_iter().take(XLSX_MAX_SHEETS) {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Xls(format!("sheet {name}: {e}")))?;
        let mut cells = 0usize;
        let mut rows = Vec::new();
        for row in range.rows() {
            if cells >= XLSX_MAX_CELLS_PER_SHEET {
                break;
            }
            cells += row.len();
            let line = row
                .iter()
                .map(|cell| cell.to_string())
                .filter(|v| !v.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !line.is_empty() {
                rows.push(line);
            }
        }
        if !rows.is_empty() {
            sheets.push(format!("Sheet: {}\n{}", name, rows.join("\n")));
        }
    }
    Ok(sheets.join("\n\n"))
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => current.push_str(&te.unescape().unwrap_or_default()),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// One space-separated line per `<row>`; shared-string cells are resolved,
/// other values are kept verbatim.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_value = false;
    let mut shared = false;
    let mut cells = 0usize;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    while cells < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if !value.is_empty() {
                    let resolved = if shared {
                        value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i))
                            .cloned()
                    } else {
                        Some(value.to_string())
                    };
                    if let Some(v) = resolved {
                        row.push(v);
                        cells += 1;
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows)
}
