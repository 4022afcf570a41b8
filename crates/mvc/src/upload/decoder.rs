//! Decoder for `multipart/form-data` bodies as described in
//! [RFC 7578](https://www.rfc-editor.org/rfc/rfc7578).
//!
//! The decoder is a [`Decoder`] fed with raw body bytes. It yields a
//! [`MultipartItem::Part`] for every part head, any number of
//! [`MultipartItem::Data`] chunks for the part content, a [`MultipartItem::PartEnd`]
//! once the next delimiter is seen and finally [`MultipartItem::Eof`] after the
//! closing delimiter.
//!
//! Content bytes are emitted as soon as they cannot be the start of a delimiter, so
//! the buffered tail never exceeds the delimiter length.

use super::MultipartError;
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use MultipartState::*;

const MAX_PART_HEADERS: usize = 16;
const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Head of a single part, taken from its `Content-Disposition` and `Content-Type` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHead {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl PartHead {
    /// A part is a file when it carries a non-empty filename.
    pub fn is_file(&self) -> bool {
        self.filename.as_deref().is_some_and(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartItem {
    Part(PartHead),
    Data(Bytes),
    PartEnd,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MultipartState {
    /// Skip everything before the first delimiter
    Preamble,
    /// Read `--` (close delimiter) or CRLF after a delimiter
    AfterDelimiter,
    /// Read the part header block
    Headers,
    /// Read the part content up to the next delimiter
    Body,
    /// The close delimiter was read, the epilogue is ignored
    End,
}

#[derive(Debug)]
pub struct MultipartDecoder {
    state: MultipartState,
    /// `--boundary`, the first delimiter may appear without a leading CRLF
    dash_boundary: Bytes,
    /// `\r\n--boundary`
    delimiter: Bytes,
    eof_emitted: bool,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        let dash_boundary = Bytes::from(format!("--{boundary}"));
        let delimiter = Bytes::from(format!("\r\n--{boundary}"));
        Self { state: Preamble, dash_boundary, delimiter, eof_emitted: false }
    }

    /// Returns true once the close delimiter has been decoded.
    pub fn is_finished(&self) -> bool {
        self.state == End
    }
}

impl Decoder for MultipartDecoder {
    type Item = MultipartItem;
    type Error = MultipartError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                // the epilogue carries no data
                src.clear();
                if self.eof_emitted {
                    return Ok(None);
                }
                self.eof_emitted = true;
                trace!("finished reading multipart body");
                return Ok(Some(MultipartItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut item = None;

            self.state = match self.state.step(src, &self.dash_boundary, &self.delimiter, &mut item) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if item.is_some() {
                return Ok(item);
            }
        }
    }
}

impl MultipartState {
    fn step(
        self,
        src: &mut BytesMut,
        dash_boundary: &[u8],
        delimiter: &[u8],
        item: &mut Option<MultipartItem>,
    ) -> Poll<Result<MultipartState, MultipartError>> {
        match self {
            Preamble => Self::read_preamble(src, dash_boundary),
            AfterDelimiter => Self::read_after_delimiter(src),
            Headers => Self::read_headers(src, item),
            Body => Self::read_body(src, delimiter, item),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_preamble(src: &mut BytesMut, dash_boundary: &[u8]) -> Poll<Result<MultipartState, MultipartError>> {
        match find(src, dash_boundary) {
            Some(index) => {
                src.advance(index + dash_boundary.len());
                Poll::Ready(Ok(AfterDelimiter))
            }
            None => {
                // keep a tail that may hold the start of the delimiter
                let keep = dash_boundary.len() - 1;
                if src.len() > keep {
                    src.advance(src.len() - keep);
                }
                Poll::Pending
            }
        }
    }

    fn read_after_delimiter(src: &mut BytesMut) -> Poll<Result<MultipartState, MultipartError>> {
        // transport padding is allowed between the boundary and CRLF
        while matches!(src.first(), Some(b' ' | b'\t')) {
            src.advance(1);
        }

        if src.len() < 2 {
            return Poll::Pending;
        }

        match &src[..2] {
            b"--" => {
                src.advance(2);
                Poll::Ready(Ok(End))
            }
            b"\r\n" => {
                src.advance(2);
                Poll::Ready(Ok(Headers))
            }
            _ => Poll::Ready(Err(MultipartError::malformed("invalid bytes after boundary delimiter"))),
        }
    }

    fn read_headers(src: &mut BytesMut, item: &mut Option<MultipartItem>) -> Poll<Result<MultipartState, MultipartError>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];

        let (consumed, head) = match httparse::parse_headers(&src[..], &mut headers) {
            Ok(httparse::Status::Complete((consumed, parsed))) => match part_head(parsed) {
                Ok(head) => (consumed, head),
                Err(e) => return Poll::Ready(Err(e)),
            },
            Ok(httparse::Status::Partial) if src.len() > MAX_HEADER_SIZE => {
                return Poll::Ready(Err(MultipartError::too_large_header(src.len(), MAX_HEADER_SIZE)));
            }
            Ok(httparse::Status::Partial) => return Poll::Pending,
            Err(httparse::Error::TooManyHeaders) => {
                return Poll::Ready(Err(MultipartError::malformed("too many part headers")));
            }
            Err(e) => return Poll::Ready(Err(MultipartError::malformed(e))),
        };

        src.advance(consumed);
        trace!(name = %head.name, filename = ?head.filename, "read multipart part head");
        *item = Some(MultipartItem::Part(head));
        Poll::Ready(Ok(Body))
    }

    fn read_body(
        src: &mut BytesMut,
        delimiter: &[u8],
        item: &mut Option<MultipartItem>,
    ) -> Poll<Result<MultipartState, MultipartError>> {
        match find(src, delimiter) {
            Some(0) => {
                src.advance(delimiter.len());
                *item = Some(MultipartItem::PartEnd);
                Poll::Ready(Ok(AfterDelimiter))
            }
            Some(index) => {
                *item = Some(MultipartItem::Data(src.split_to(index).freeze()));
                Poll::Ready(Ok(Body))
            }
            None => {
                let keep = delimiter.len() - 1;
                if src.len() <= keep {
                    return Poll::Pending;
                }
                let safe = src.len() - keep;
                // the tail may still start a delimiter, only emit what cannot
                let safe = match src[safe..].iter().position(|&b| b == b'\r') {
                    Some(cr) => safe + cr,
                    None => src.len(),
                };
                *item = Some(MultipartItem::Data(src.split_to(safe).freeze()));
                Poll::Ready(Ok(Body))
            }
        }
    }
}

fn part_head(headers: &[httparse::Header<'_>]) -> Result<PartHead, MultipartError> {
    let mut disposition = None;
    let mut content_type = None;

    for header in headers {
        let value = String::from_utf8_lossy(header.value);
        if header.name.eq_ignore_ascii_case("content-disposition") {
            disposition = Some(value.into_owned());
        } else if header.name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_owned());
        }
    }

    let disposition = disposition.ok_or_else(|| MultipartError::malformed("part without content-disposition"))?;
    let (name, filename) = parse_disposition(&disposition)
        .ok_or_else(|| MultipartError::malformed(format!("invalid content-disposition: {disposition}")))?;

    Ok(PartHead { name, filename, content_type })
}

/// Parses `form-data; name="field"; filename="a.txt"` into the field name and the
/// optional filename.
pub(crate) fn parse_disposition(value: &str) -> Option<(String, Option<String>)> {
    let mut params = split_params(value).into_iter();
    let kind = params.next()?;
    if !kind.trim().eq_ignore_ascii_case("form-data") {
        return None;
    }

    let mut name = None;
    let mut filename = None;
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .map_or_else(|| raw.to_owned(), |v| v.replace("\\\"", "\""));

        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(unquoted),
            "filename" => filename = Some(unquoted),
            _ => {}
        }
    }

    Some((name?, filename))
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn crlf(s: &str) -> BytesMut {
        BytesMut::from(s.replace('\n', "\r\n").as_str())
    }

    fn decode_all(decoder: &mut MultipartDecoder, buf: &mut BytesMut) -> Vec<MultipartItem> {
        let mut items = Vec::new();
        while let Some(item) = decoder.decode(buf).unwrap() {
            items.push(item);
        }
        items
    }

    /// merges adjacent data chunks so assertions don't depend on chunking
    fn merged(items: Vec<MultipartItem>) -> Vec<MultipartItem> {
        let mut out: Vec<MultipartItem> = Vec::new();
        for item in items {
            match (out.last_mut(), item) {
                (Some(MultipartItem::Data(prev)), MultipartItem::Data(next)) => {
                    let mut joined = BytesMut::from(prev.as_ref());
                    joined.extend_from_slice(&next);
                    *prev = joined.freeze();
                }
                (_, item) => out.push(item),
            }
        }
        out
    }

    const BODY: &str = indoc! {r#"
        preamble to ignore
        --XyZ
        Content-Disposition: form-data; name="title"

        hello world
        --XyZ
        Content-Disposition: form-data; name="doc"; filename="a.txt"
        Content-Type: text/plain

        line one
        line two
        --XyZ--
        epilogue
    "#};

    #[test]
    fn decodes_fields_and_files() {
        let mut decoder = MultipartDecoder::new("XyZ");
        let mut buf = crlf(BODY);

        let items = merged(decode_all(&mut decoder, &mut buf));

        assert_eq!(
            items,
            vec![
                MultipartItem::Part(PartHead { name: "title".into(), filename: None, content_type: None }),
                MultipartItem::Data(Bytes::from_static(b"hello world")),
                MultipartItem::PartEnd,
                MultipartItem::Part(PartHead {
                    name: "doc".into(),
                    filename: Some("a.txt".into()),
                    content_type: Some("text/plain".into())
                }),
                MultipartItem::Data(Bytes::from_static(b"line one\r\nline two")),
                MultipartItem::PartEnd,
                MultipartItem::Eof,
            ]
        );
        assert!(decoder.is_finished());
    }

    #[test]
    fn decodes_byte_by_byte() {
        let full = crlf(BODY);
        let mut decoder = MultipartDecoder::new("XyZ");
        let mut buf = BytesMut::new();
        let mut items = Vec::new();

        for byte in full.iter() {
            buf.extend_from_slice(&[*byte]);
            items.extend(decode_all(&mut decoder, &mut buf));
        }

        let items = merged(items);
        assert_eq!(items.len(), 7);
        assert_eq!(items[4], MultipartItem::Data(Bytes::from_static(b"line one\r\nline two")));
        assert_eq!(items[6], MultipartItem::Eof);
    }

    #[test]
    fn incomplete_body_is_not_finished() {
        let mut decoder = MultipartDecoder::new("XyZ");
        let mut buf = crlf(indoc! {r#"
            --XyZ
            Content-Disposition: form-data; name="title"

            partial
        "#});

        let _ = decode_all(&mut decoder, &mut buf);
        assert!(!decoder.is_finished());
    }

    #[test]
    fn garbage_after_boundary_is_an_error() {
        let mut decoder = MultipartDecoder::new("XyZ");
        let mut buf = BytesMut::from("--XyZxx\r\n");
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn missing_disposition_is_an_error() {
        let mut decoder = MultipartDecoder::new("b");
        let mut buf = crlf("--b\nContent-Type: text/plain\n\nx\n--b--\n");
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn parse_disposition_params() {
        assert_eq!(
            parse_disposition(r#"form-data; name="f"; filename="a;b.txt""#),
            Some(("f".to_owned(), Some("a;b.txt".to_owned())))
        );
        assert_eq!(parse_disposition("form-data; name=plain"), Some(("plain".to_owned(), None)));
        assert_eq!(parse_disposition(r#"attachment; name="x""#), None);
        assert_eq!(parse_disposition("form-data"), None);
    }
}
