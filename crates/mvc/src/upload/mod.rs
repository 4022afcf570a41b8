//! Extraction of files and text fields from `multipart/form-data` request bodies.
//!
//! The request body is read frame by frame and fed to a [`MultipartDecoder`]. Text
//! parts become form fields, parts that carry a filename become [`UploadedFile`]s.
//! Malformed bodies never fail the request: they are logged and yield an empty
//! [`Upload`].

mod decoder;
mod file;

pub use decoder::{MultipartDecoder, MultipartItem, PartHead};
pub use file::{sanitize_filename, UploadedFile, DEFAULT_CACHE_THRESHOLD};

use crate::error::BodyError;
use bytes::{Bytes, BytesMut};
use file::FileSink;
use http::HeaderMap;
use http_body::Body;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("part header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("malformed multipart body: {reason}")]
    Malformed { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl MultipartError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn malformed<S: ToString>(str: S) -> Self {
        Self::Malformed { reason: str.to_string() }
    }
}

/// Files and text fields extracted from one multipart request.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    files: HashMap<String, Vec<UploadedFile>>,
    fields: HashMap<String, Vec<String>>,
}

impl Upload {
    pub fn from_parts(files: HashMap<String, Vec<UploadedFile>>, fields: HashMap<String, Vec<String>>) -> Self {
        Self { files, fields }
    }

    pub fn files(&self) -> &HashMap<String, Vec<UploadedFile>> {
        &self.files
    }

    pub fn fields(&self) -> &HashMap<String, Vec<String>> {
        &self.fields
    }

    /// The first file submitted under `name`.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).and_then(|files| files.first())
    }

    /// The first text value submitted under `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.fields.is_empty()
    }

    pub fn into_parts(self) -> (HashMap<String, Vec<UploadedFile>>, HashMap<String, Vec<String>>) {
        (self.files, self.fields)
    }
}

/// Reads multipart request bodies into an [`Upload`].
#[derive(Debug, Clone)]
pub struct UploadExtractor {
    cache_threshold: usize,
    spool_dir: Option<PathBuf>,
}

impl Default for UploadExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_THRESHOLD)
    }
}

impl UploadExtractor {
    /// `cache_threshold` is the largest file size kept in memory.
    pub fn new(cache_threshold: usize) -> Self {
        Self { cache_threshold, spool_dir: None }
    }

    /// Spools large files into `dir` instead of the system temp directory.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    /// Returns true if the request declares a `multipart/*` content type.
    pub fn is_multipart(headers: &HeaderMap) -> bool {
        content_type(headers).is_some_and(|mime| mime.type_() == mime::MULTIPART)
    }

    /// Extracts all parts of a multipart body.
    ///
    /// Non-multipart requests yield an empty [`Upload`] without touching the body.
    /// A missing boundary or malformed content is logged and also yields an empty
    /// result. Only failures reading the body itself are returned as errors.
    pub async fn extract<B>(&self, headers: &HeaderMap, body: B) -> Result<Upload, BodyError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some(mime) = content_type(headers).filter(|mime| mime.type_() == mime::MULTIPART) else {
            return Ok(Upload::default());
        };

        let Some(boundary) = mime.get_param(mime::BOUNDARY).map(|b| b.as_str().to_owned()) else {
            warn!(content_type = %mime, "multipart request without boundary, ignoring body");
            return Ok(Upload::default());
        };

        let charset = mime.get_param(mime::CHARSET).map(|c| c.as_str().to_owned());
        let mut collector = PartCollector::new(self.cache_threshold, self.spool_dir.clone(), charset);
        let mut decoder = MultipartDecoder::new(&boundary);
        let mut buf = BytesMut::new();

        let mut body = std::pin::pin!(body);
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| BodyError::from_source(e.into()))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            buf.extend_from_slice(&data);

            if let Err(e) = collector.drain(&mut decoder, &mut buf).await {
                warn!(cause = %e, "failed to parse multipart body, ignoring uploaded content");
                return Ok(Upload::default());
            }
        }

        if !decoder.is_finished() {
            warn!("multipart body ended before the closing boundary, ignoring uploaded content");
            return Ok(Upload::default());
        }

        let upload = collector.upload;
        debug!(files = upload.files.len(), fields = upload.fields.len(), "extracted multipart body");
        Ok(upload)
    }
}

fn content_type(headers: &HeaderMap) -> Option<mime::Mime> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
}

enum PartSink {
    Field { name: String, buf: BytesMut },
    File(FileSink),
}

struct PartCollector {
    cache_threshold: usize,
    spool_dir: Option<PathBuf>,
    charset: Option<String>,
    current: Option<PartSink>,
    upload: Upload,
}

impl PartCollector {
    fn new(cache_threshold: usize, spool_dir: Option<PathBuf>, charset: Option<String>) -> Self {
        Self { cache_threshold, spool_dir, charset, current: None, upload: Upload::default() }
    }

    async fn drain(&mut self, decoder: &mut MultipartDecoder, buf: &mut BytesMut) -> Result<(), MultipartError> {
        while let Some(item) = decoder.decode(buf)? {
            self.accept(item).await?;
        }
        Ok(())
    }

    async fn accept(&mut self, item: MultipartItem) -> Result<(), MultipartError> {
        match item {
            MultipartItem::Part(head) => {
                let sink = if head.is_file() {
                    let filename = head.filename.unwrap_or_default();
                    PartSink::File(FileSink::new(
                        head.name,
                        filename,
                        head.content_type,
                        self.cache_threshold,
                        self.spool_dir.clone(),
                    ))
                } else {
                    PartSink::Field { name: head.name, buf: BytesMut::new() }
                };
                self.current = Some(sink);
            }
            MultipartItem::Data(bytes) => match &mut self.current {
                Some(PartSink::Field { buf, .. }) => buf.extend_from_slice(&bytes),
                Some(PartSink::File(sink)) => sink.write(&bytes).await?,
                None => return Err(MultipartError::malformed("part content without part head")),
            },
            MultipartItem::PartEnd => match self.current.take() {
                Some(PartSink::Field { name, buf }) => {
                    let text = decode_text(&buf, self.charset.as_deref());
                    if !text.is_empty() {
                        self.upload.fields.entry(name).or_default().push(text);
                    }
                }
                Some(PartSink::File(sink)) => {
                    let file = sink.finish().await?;
                    self.upload.files.entry(file.field_name().to_owned()).or_default().push(file);
                }
                None => {}
            },
            MultipartItem::Eof => {}
        }
        Ok(())
    }
}

/// Decodes a text part with the request charset. UTF-8 is the default.
fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.map(str::to_ascii_lowercase).as_deref() {
        None | Some("utf-8" | "utf8") => String::from_utf8_lossy(bytes).into_owned(),
        Some("iso-8859-1" | "latin1" | "latin-1") => bytes.iter().map(|&b| char::from(b)).collect(),
        Some("us-ascii" | "ascii") => bytes.iter().map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' }).collect(),
        Some(other) => {
            warn!(charset = other, "unsupported charset for multipart text, decoding as utf-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
