//! Multi-format text extraction for uploaded documents.
//!
//! Dispatches on the declared MIME type over a closed set of formats:
//! plain text, PDF, and Word (DOCX). Extraction is pure: bytes in, UTF-8
//! text out; it never touches the index.

use std::io::Read;

use crate::error::RagError;

/// Supported MIME types.
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from document bytes according to the declared MIME type.
///
/// Fails with [`RagError::UnsupportedFormat`] for unrecognized types, and
/// [`RagError::CorruptDocument`] when parsing raises a structural error or
/// no text content is found.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> Result<String, RagError> {
    let text = match mime_type {
        MIME_TEXT => String::from_utf8_lossy(bytes).into_owned(),
        MIME_PDF => extract_pdf(bytes)?,
        MIME_DOCX => extract_docx(bytes)?,
        other => return Err(RagError::UnsupportedFormat(other.to_string())),
    };

    if text.trim().is_empty() {
        return Err(RagError::CorruptDocument(
            "no text content extracted".to_string(),
        ));
    }
    Ok(text)
}

/// True when the MIME type belongs to the recognized set.
pub fn is_supported(mime_type: &str) -> bool {
    matches!(mime_type, MIME_TEXT | MIME_PDF | MIME_DOCX)
}

/// Map a filename extension to a supported MIME type. Used for CLI
/// ingestion and for uploads whose declared content type is missing or
/// a generic octet-stream.
pub fn mime_for_filename(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "md" => Some(MIME_TEXT),
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        _ => None,
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, RagError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::CorruptDocument(format!("PDF parse failed: {}", e)))
}

/// DOCX: pull `word/document.xml` out of the ZIP container and join the
/// text runs of each paragraph with blank lines.
fn extract_docx(bytes: &[u8]) -> Result<String, RagError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| RagError::CorruptDocument(format!("DOCX container: {}", e)))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| RagError::CorruptDocument("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| RagError::CorruptDocument(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(RagError::CorruptDocument(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_paragraphs(&doc_xml)
}

/// Walk `w:p` paragraph elements collecting their `w:t` text runs.
fn extract_paragraphs(xml: &[u8]) -> Result<String, RagError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !current.trim().is_empty() {
                    paragraphs.push(std::mem::take(&mut current));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(RagError::CorruptDocument(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text(b"hello there", MIME_TEXT).unwrap();
        assert_eq!(text, "hello there");
    }

    #[test]
    fn unsupported_mime_is_rejected() {
        let err = extract_text(b"PK", "application/zip").unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_is_corrupt() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, RagError::CorruptDocument(_)));
    }

    #[test]
    fn invalid_docx_is_corrupt() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, RagError::CorruptDocument(_)));
    }

    #[test]
    fn whitespace_only_text_is_corrupt() {
        let err = extract_text(b"   \n\t ", MIME_TEXT).unwrap_err();
        assert!(matches!(err, RagError::CorruptDocument(_)));
    }

    #[test]
    fn docx_paragraphs_joined_with_blank_lines() {
        let bytes = minimal_docx(&["First paragraph.", "Second paragraph."]);
        let text = extract_text(&bytes, MIME_DOCX).unwrap();
        assert_eq!(text, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn filename_mapping_covers_supported_extensions() {
        assert_eq!(mime_for_filename("notes.txt"), Some(MIME_TEXT));
        assert_eq!(mime_for_filename("Report.PDF"), Some(MIME_PDF));
        assert_eq!(mime_for_filename("thesis.docx"), Some(MIME_DOCX));
        assert_eq!(mime_for_filename("archive.zip"), None);
    }
}
