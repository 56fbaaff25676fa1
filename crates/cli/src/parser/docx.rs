use crate::service::ServiceError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";

/// Paragraph text of a DOCX body, joined by newlines
pub(super) fn parse_docx(bytes: &[u8]) -> Result<Vec<String>, ServiceError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ServiceError::Parse(format!("docx: not a zip archive: {e}")))?;

    let mut xml = String::new();
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ServiceError::Parse(format!("docx: missing {DOCUMENT_PART}: {e}")))?;
    part.read_to_string(&mut xml)
        .map_err(|e| ServiceError::Parse(format!("docx: unreadable {DOCUMENT_PART}: {e}")))?;

    Ok(vec![paragraphs(&xml)?.join("\n")])
}

/// Concatenated `w:t` runs of every `w:p`, with tabs and breaks kept
fn paragraphs(xml: &str) -> Result<Vec<String>, ServiceError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ServiceError::Parse(format!("docx: malformed XML: {e}")))?;
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Event::Text(text) if in_text => {
                let text = text
                    .unescape()
                    .map_err(|e| ServiceError::Parse(format!("docx: bad text run: {e}")))?;
                current.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}
