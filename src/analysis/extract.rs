//! Plain-text extraction from uploaded bytes.
//!
//! Extraction never fails: unsupported or unreadable input yields a short
//! marker string so the analyzer still sees the task context.

use std::io::{Cursor, Read};

use regex::Regex;

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub fn extract_text(bytes: &[u8], media_type: &str) -> String {
    let media_type = media_type.trim().to_ascii_lowercase();
    if media_type.starts_with("text/") || media_type == "application/json" {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match media_type.as_str() {
        "application/zip" | "application/x-zip-compressed" => from_zip(bytes),
        DOCX => docx_text(bytes)
            .unwrap_or_else(|| "DOCX parsing failed - document may be corrupted".to_string()),
        "application/pdf" => pdf_text(bytes).unwrap_or_else(|| {
            "PDF parsing failed - document may be corrupted or password protected".to_string()
        }),
        _ => "Unsupported file type".to_string(),
    }
}

/// First readable `.pdf`, `.docx` or `.txt` entry wins, in archive order.
fn from_zip(bytes: &[u8]) -> String {
    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!("Unreadable ZIP upload: {}", e);
            return "ZIP archive could not be read".to_string();
        }
    };

    for i in 0..archive.len() {
        let Ok(mut entry) = archive.by_index(i) else {
            continue;
        };
        let name = entry.name().to_ascii_lowercase();
        let parse: fn(&[u8]) -> Option<String> = if name.ends_with(".pdf") {
            pdf_text
        } else if name.ends_with(".docx") {
            docx_text
        } else if name.ends_with(".txt") {
            |data| Some(String::from_utf8_lossy(data).into_owned())
        } else {
            continue;
        };

        let mut data = Vec::new();
        if let Err(e) = entry.read_to_end(&mut data) {
            tracing::warn!("Failed to read {} in ZIP: {}", entry.name(), e);
            continue;
        }
        match parse(&data) {
            Some(text) => return text,
            None => tracing::warn!("Failed to parse {} in ZIP", entry.name()),
        }
    }
    "No supported document found in ZIP or all documents failed to parse".to_string()
}

/// Text of every page. pdf-extract panics on some malformed fonts, so a
/// panic is treated like any other parse failure.
fn pdf_text(bytes: &[u8]) -> Option<String> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            tracing::warn!("PDF parsing failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("PDF parser panicked");
            None
        }
    }
}

/// Text runs of `word/document.xml`, one line per paragraph.
fn docx_text(bytes: &[u8]) -> Option<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .ok()?
        .read_to_string(&mut xml)
        .ok()?;

    let tags = Regex::new(r"<[^>]+>").ok()?;
    let with_breaks = xml.replace("</w:p>", "\n");
    let text = tags.replace_all(&with_breaks, "");
    Some(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (name, data) in entries {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(extract_text(b"GSTR-3B filed", "text/plain"), "GSTR-3B filed");
        assert_eq!(extract_text(b"x", "image/png"), "Unsupported file type");
    }

    #[test]
    fn test_zip_picks_first_text_entry() {
        let bytes = zip_with(&[("scan.png", b"\x89PNG"), ("notes.TXT", b"challan paid")]);
        assert_eq!(extract_text(&bytes, "application/zip"), "challan paid");
        assert_eq!(
            extract_text(b"not a zip", "application/zip"),
            "ZIP archive could not be read"
        );
    }

    #[test]
    fn test_broken_pdf_gets_marker() {
        assert_eq!(
            extract_text(b"%PDF-1.4 truncated", "application/pdf"),
            "PDF parsing failed - document may be corrupted or password protected"
        );
    }

    #[test]
    fn test_zip_skips_unparseable_entries_in_order() {
        let xml = br#"<w:document><w:p><w:t>Board resolution</w:t></w:p></w:document>"#;
        let docx = zip_with(&[("word/document.xml", xml)]);
        let bytes = zip_with(&[
            ("scan.pdf", b"not really a pdf"),
            ("resolution.docx", &docx),
            ("notes.txt", b"later entry"),
        ]);
        assert_eq!(extract_text(&bytes, "application/zip"), "Board resolution");

        let bytes = zip_with(&[("scan.pdf", b"not really a pdf"), ("photo.jpg", b"\xff")]);
        assert_eq!(
            extract_text(&bytes, "application/zip"),
            "No supported document found in ZIP or all documents failed to parse"
        );
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = br#"<w:document><w:body><w:p><w:r><w:t>Form 16</w:t></w:r></w:p><w:p><w:r><w:t>Issued</w:t></w:r></w:p></w:body></w:document>"#;
        let docx = zip_with(&[("word/document.xml", xml)]);
        assert_eq!(extract_text(&docx, DOCX), "Form 16\nIssued");
    }
}
