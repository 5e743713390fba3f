//! Content-type-specific text extraction.
//!
//! Produces page-tagged text ready for chunking. Unknown content types
//! fall back to the plain-text loader.

use std::io::Write;
use std::process::Command;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: usize,
    pub text: String,
}

/// Map a file extension to the mime type recorded for the document.
pub fn mime_type_from_extension(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "json" => "application/json",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

pub fn load_document(bytes: &[u8], mime_type: &str) -> Result<Vec<PageText>, ApiError> {
    match mime_type {
        "application/pdf" => load_pdf(bytes),
        "text/csv" | "application/csv" => Ok(load_csv(bytes)),
        _ => Ok(load_plain_text(bytes)),
    }
}

fn load_plain_text(bytes: &[u8]) -> Vec<PageText> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    if text.is_empty() {
        return Vec::new();
    }
    vec![PageText { page: 0, text }]
}

/// Extract PDF text with the `pdftotext` binary (poppler), one page per
/// form-feed-separated block.
fn load_pdf(bytes: &[u8]) -> Result<Vec<PageText>, ApiError> {
    let temp_path = std::env::temp_dir().join(format!(
        "corpora-pdf-{}-{}.pdf",
        std::process::id(),
        uuid::Uuid::new_v4()
    ));

    let write_result = std::fs::File::create(&temp_path)
        .and_then(|mut file| file.write_all(bytes))
        .map_err(|err| ApiError::Internal(format!("failed to stage pdf: {err}")));
    if let Err(err) = write_result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(err);
    }

    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(&temp_path)
        .arg("-")
        .output();
    let _ = std::fs::remove_file(&temp_path);

    match output {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            Ok(text
                .split('\u{c}')
                .enumerate()
                .filter(|(_, content)| !content.trim().is_empty())
                .map(|(page, content)| PageText {
                    page,
                    text: content.to_string(),
                })
                .collect())
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ApiError::Internal(format!(
                "pdftotext failed: {stderr}"
            )))
        }
        Err(err) => Err(ApiError::Internal(format!(
            "could not run pdftotext (is poppler installed?): {err}"
        ))),
    }
}

/// Render each CSV record as `header: value` lines, one page entry per
/// record. Page numbers are not meaningful for tabular data and stay 0.
fn load_csv(bytes: &[u8]) -> Vec<PageText> {
    let text = String::from_utf8_lossy(bytes);
    let mut records = text.lines().filter(|line| !line.trim().is_empty());

    let Some(header_line) = records.next() else {
        return Vec::new();
    };
    let headers = parse_csv_record(header_line);

    records
        .map(|line| {
            let fields = parse_csv_record(line);
            let rendered = headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = fields.get(i).map(String::as_str).unwrap_or_default();
                    format!("{header}: {value}")
                })
                .collect::<Vec<_>>()
                .join("\n");
            PageText {
                page: 0,
                text: rendered,
            }
        })
        .collect()
}

/// Minimal quoted-field CSV record parser.
fn parse_csv_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
