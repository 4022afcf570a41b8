//! Uploaded file handles.
//!
//! Small files stay in memory. Once a part grows past the cache threshold its bytes
//! are spooled to a temporary file and read back from disk on demand, so large
//! uploads are never held in memory as a whole.

use bytes::{Bytes, BytesMut};
use rand::RngCore;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

/// Default in-memory cache threshold for uploaded files: 2 MiB.
pub const DEFAULT_CACHE_THRESHOLD: usize = 2 * 1024 * 1024;

/// A file received as part of a `multipart/form-data` request.
///
/// Cloning is cheap, clones share the same underlying bytes or spool file.
#[derive(Clone)]
pub struct UploadedFile {
    inner: Arc<Inner>,
}

struct Inner {
    field_name: String,
    original_filename: String,
    content_type: Option<String>,
    size: u64,
    storage: Storage,
}

enum Storage {
    Memory(Bytes),
    // the spool file is removed when the last handle is dropped
    Spooled(TempPath),
}

impl UploadedFile {
    /// Creates an in-memory file. The filename is sanitized.
    pub fn from_bytes(
        field_name: impl Into<String>,
        filename: &str,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self::new(field_name.into(), filename, content_type, bytes.len() as u64, Storage::Memory(bytes))
    }

    fn new(field_name: String, filename: &str, content_type: Option<String>, size: u64, storage: Storage) -> Self {
        let inner = Inner { field_name, original_filename: sanitize_filename(filename), content_type, size, storage };
        Self { inner: Arc::new(inner) }
    }

    /// The form field this file was submitted under.
    pub fn field_name(&self) -> &str {
        &self.inner.field_name
    }

    /// The client supplied file name, reduced to a safe base name.
    pub fn original_filename(&self) -> &str {
        &self.inner.original_filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn is_empty(&self) -> bool {
        self.inner.size == 0 || self.inner.original_filename.is_empty()
    }

    /// Returns true when the bytes are cached in memory rather than spooled to disk.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.inner.storage, Storage::Memory(_))
    }

    /// Lowercase extension of the file name without the dot, or an empty string.
    pub fn extension(&self) -> String {
        self.inner
            .original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn is_image(&self) -> bool {
        !self.is_empty() && self.content_type().is_some_and(|ct| ct.starts_with("image/"))
    }

    /// Reads the whole content.
    ///
    /// In-memory files return their cached bytes, spooled files are read from disk
    /// each time and the result is not cached.
    pub async fn bytes(&self) -> io::Result<Bytes> {
        match &self.inner.storage {
            Storage::Memory(bytes) => Ok(bytes.clone()),
            Storage::Spooled(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }

    /// Writes the content to `dest`, creating missing parent directories and
    /// replacing an existing file.
    pub async fn transfer_to(&self, dest: impl AsRef<Path>) -> io::Result<()> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        match &self.inner.storage {
            Storage::Memory(bytes) => tokio::fs::write(dest, bytes).await?,
            Storage::Spooled(path) => {
                tokio::fs::copy(path, dest).await?;
            }
        }

        debug!(field = %self.inner.field_name, dest = %dest.display(), size = self.inner.size, "transferred uploaded file");
        Ok(())
    }

    /// Stores the file under `directory` with a unique random name that keeps the
    /// original extension, and returns the destination path.
    pub async fn save_to_directory(&self, directory: impl AsRef<Path>) -> io::Result<PathBuf> {
        if self.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot save an empty file"));
        }

        let mut random = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random);
        let extension = self.extension();
        let file_name = if extension.is_empty() {
            hex::encode(random)
        } else {
            format!("{}.{}", hex::encode(random), extension)
        };

        let dest = directory.as_ref().join(file_name);
        self.transfer_to(&dest).await?;
        Ok(dest)
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("field_name", &self.inner.field_name)
            .field("original_filename", &self.inner.original_filename)
            .field("content_type", &self.inner.content_type)
            .field("size", &self.inner.size)
            .field("in_memory", &self.is_in_memory())
            .finish()
    }
}

impl PartialEq for UploadedFile {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.field_name == other.inner.field_name
                && self.inner.original_filename == other.inner.original_filename
                && self.inner.content_type == other.inner.content_type
                && self.inner.size == other.inner.size)
    }
}

impl Serialize for UploadedFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UploadedFile", 4)?;
        state.serialize_field("name", &self.inner.field_name)?;
        state.serialize_field("filename", &self.inner.original_filename)?;
        state.serialize_field("contentType", &self.inner.content_type)?;
        state.serialize_field("size", &self.inner.size)?;
        state.end()
    }
}

/// Reduces a client supplied file name to a safe base name.
///
/// Directory components (`/` and `\`) are stripped and every character outside
/// `[A-Za-z0-9._-]` becomes `_`. A bare `.` or `..` becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    match base {
        "." | ".." => "_".to_owned(),
        _ => base
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect(),
    }
}

/// Accumulates the bytes of one file part, spooling to disk past the threshold.
pub(crate) struct FileSink {
    field_name: String,
    filename: String,
    content_type: Option<String>,
    threshold: usize,
    spool_dir: Option<PathBuf>,
    size: u64,
    state: SinkState,
}

enum SinkState {
    Memory(BytesMut),
    Spooling { file: tokio::fs::File, path: TempPath },
}

impl FileSink {
    pub(crate) fn new(
        field_name: String,
        filename: String,
        content_type: Option<String>,
        threshold: usize,
        spool_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            field_name,
            filename,
            content_type,
            threshold,
            spool_dir,
            size: 0,
            state: SinkState::Memory(BytesMut::new()),
        }
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.size += chunk.len() as u64;
        match &mut self.state {
            SinkState::Memory(buf) if buf.len() + chunk.len() <= self.threshold => {
                buf.extend_from_slice(chunk);
            }
            SinkState::Memory(buf) => {
                let named = match &self.spool_dir {
                    Some(dir) => tempfile::Builder::new().prefix("upload-").tempfile_in(dir)?,
                    None => tempfile::Builder::new().prefix("upload-").tempfile()?,
                };
                let (std_file, path) = named.into_parts();
                let mut file = tokio::fs::File::from_std(std_file);
                file.write_all(buf).await?;
                file.write_all(chunk).await?;
                trace!(field = %self.field_name, path = %path.display(), "upload exceeded cache threshold, spooling to disk");
                self.state = SinkState::Spooling { file, path };
            }
            SinkState::Spooling { file, .. } => file.write_all(chunk).await?,
        }
        Ok(())
    }

    pub(crate) async fn finish(self) -> io::Result<UploadedFile> {
        let storage = match self.state {
            SinkState::Memory(buf) => Storage::Memory(buf.freeze()),
            SinkState::Spooling { mut file, path } => {
                file.flush().await?;
                Storage::Spooled(path)
            }
        };
        Ok(UploadedFile::new(self.field_name, &self.filename, self.content_type, self.size, storage))
    }
}
