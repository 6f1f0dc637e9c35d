//! Parsed XHTML content document.
//!
//! The document owns the extracted byte buffer and an index of its text
//! nodes as byte ranges into that buffer. Because text is addressed by
//! range, the byte offset of a text node inside the original file falls
//! out directly, which is what the offset-mapping helpers rely on.
//! Entities are left undecoded and whitespace-only text nodes are kept.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::Result;

use super::local_name;

/// One text node, in document order.
#[derive(Debug, Clone, Copy)]
pub struct TextSpan {
    /// Byte offset of the node inside the file.
    pub start: usize,
    pub len: usize,
    /// Whether the node sits under `<html><body>`.
    pub in_body: bool,
}

/// An XHTML file parsed into its text-node index.
#[derive(Debug)]
pub struct XhtmlDoc {
    buffer: Vec<u8>,
    spans: Vec<TextSpan>,
}

impl XhtmlDoc {
    /// Parse the buffer produced by the archive reader (content plus a
    /// trailing NUL byte, which is not part of the document).
    pub fn parse(buffer: Vec<u8>) -> Result<Self> {
        let content_len = buffer.len().saturating_sub(1);
        let mut spans = Vec::new();

        {
            let mut reader = Reader::from_reader(&buffer[..content_len]);
            let mut elements: Vec<Vec<u8>> = Vec::new();

            loop {
                match reader.read_event()? {
                    Event::Start(e) => {
                        elements.push(local_name(e.name().as_ref()).to_vec());
                    }
                    Event::End(_) => {
                        elements.pop();
                    }
                    Event::Text(e) => {
                        let len = e.as_ref().len();
                        let end = reader.buffer_position() as usize;
                        push_span(&mut spans, end - len, len, in_body(&elements));
                    }
                    Event::GeneralRef(e) => {
                        // An undecoded entity reference; the raw bytes
                        // include the surrounding `&` and `;`.
                        let len = e.as_ref().len() + 2;
                        let end = reader.buffer_position() as usize;
                        push_span(&mut spans, end - len, len, in_body(&elements));
                    }
                    Event::Eof => break,
                    _ => {}
                }
            }
        }

        Ok(Self { buffer, spans })
    }

    /// Raw bytes of a text node.
    pub fn text(&self, span: TextSpan) -> &[u8] {
        &self.buffer[span.start..span.start + span.len]
    }

    /// Every text node, in document order.
    pub fn spans(&self) -> impl Iterator<Item = TextSpan> + '_ {
        self.spans.iter().copied()
    }

    /// Text nodes under `<html><body>`, in document order.
    pub fn body_spans(&self) -> impl Iterator<Item = TextSpan> + '_ {
        self.spans.iter().copied().filter(|span| span.in_body)
    }
}

fn in_body(elements: &[Vec<u8>]) -> bool {
    elements.len() >= 2 && elements[0] == b"html" && elements[1] == b"body"
}

/// Append a text range, fusing it with the previous one when they are
/// contiguous in the buffer; entity references split the parser's text
/// events but belong to the same text node.
fn push_span(spans: &mut Vec<TextSpan>, start: usize, len: usize, in_body: bool) {
    if let Some(last) = spans.last_mut() {
        if last.start + last.len == start && last.in_body == in_body {
            last.len += len;
            return;
        }
    }
    spans.push(TextSpan { start, len, in_body });
}
