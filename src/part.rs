use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncRead;

use crate::config::ChunkConfig;
use crate::content::Content;
use crate::progress::{ChunkedProgress, ProgressFn, Source};
use crate::Error;

/// Identity of a part inside a form: field name, file name and content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartMeta {
    name: Option<String>,
    content_type: Option<String>,
    file_name: String,
}

impl PartMeta {
    fn new<S: Into<String>>(file_name: S) -> Result<Self, Error> {
        let file_name = file_name.into();
        if file_name.is_empty() {
            return Err(Error::invalid_argument("file_name"));
        }

        Ok(Self {
            name: None,
            content_type: None,
            file_name,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Sets the content's `Content-Type` to ours, unless ours is absent or empty.
    fn apply_to(&self, content: &mut Content) -> Result<(), Error> {
        let content_type = match self.content_type() {
            Some(ct) if !ct.is_empty() => ct,
            _ => return Ok(()),
        };

        // Only validated. The header keeps the exact string the caller gave.
        content_type.parse::<mime::Mime>()?;
        content.set_content_type(content_type)
    }
}

macro_rules! meta_setters {
    ($part:ty) => {
        impl $part {
            /// Sets the form field name.
            pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
                self.meta.name = Some(name.into());
                self
            }

            /// Sets the MIME type sent as the part's `Content-Type`.
            pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
                self.meta.content_type = Some(content_type.into());
                self
            }

            pub fn meta(&self) -> &PartMeta {
                &self.meta
            }
        }
    };
}

/// A part whose body is an in-memory buffer.
#[derive(Debug, Clone)]
pub struct ByteArrayPart {
    meta: PartMeta,
    value: Bytes,
}

impl ByteArrayPart {
    pub fn new<B, S>(value: B, file_name: S) -> Result<Self, Error>
    where
        B: Into<Bytes>,
        S: Into<String>,
    {
        Ok(Self {
            meta: PartMeta::new(file_name)?,
            value: value.into(),
        })
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}

meta_setters!(ByteArrayPart);

/// A part whose body is read from a file, opened only when the part is
/// converted.
#[derive(Debug, Clone)]
pub struct FileInfoPart {
    meta: PartMeta,
    value: PathBuf,
}

impl FileInfoPart {
    pub fn new<P, S>(value: P, file_name: S) -> Result<Self, Error>
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Ok(Self {
            meta: PartMeta::new(file_name)?,
            value: value.into(),
        })
    }

    /// Uses the last component of `path` as the file name.
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Result<Self, Error> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid_argument("file_name"))?;

        Self::new(path, file_name)
    }

    pub fn value(&self) -> &Path {
        &self.value
    }

    async fn create_content(&self) -> Result<Content, Error> {
        let file = File::open(&self.value).await?;
        let len = file.metadata().await?.len();

        log::debug!("Opened {:?} ({} bytes)", self.value, len);

        Ok(Content::from_file(file, len))
    }
}

meta_setters!(FileInfoPart);

/// A part whose body is copied from an async reader of known length,
/// optionally reporting progress as each chunk is written.
pub struct StreamPart {
    meta: PartMeta,
    value: Source,
    length: u64,
    progress: Option<ProgressFn>,
    config: ChunkConfig,
}

impl StreamPart {
    /// `length` is the number of bytes the part sends. It is taken as given:
    /// a reader yielding fewer bytes fails the write, extra bytes are never
    /// read.
    pub fn new<R, S>(value: R, length: u64, file_name: S) -> Result<Self, Error>
    where
        R: AsyncRead + Send + Unpin + 'static,
        S: Into<String>,
    {
        Ok(Self {
            meta: PartMeta::new(file_name)?,
            value: Box::new(value),
            length,
            progress: None,
            config: ChunkConfig::default(),
        })
    }

    /// Streams an open file, taking its current size as the length.
    pub async fn from_file<S: Into<String>>(file: File, file_name: S) -> Result<Self, Error> {
        let length = file.metadata().await?.len();
        Self::new(file, length, file_name)
    }

    /// Called with the percentage written after every chunk.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn with_chunk_config(mut self, config: ChunkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn create_content(self) -> (PartMeta, Content) {
        let chunks = ChunkedProgress::new(self.value, self.length, self.config, self.progress);
        (self.meta, Content::from_stream(chunks))
    }
}

meta_setters!(StreamPart);

impl fmt::Debug for StreamPart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StreamPart")
            .field("meta", &self.meta)
            .field("length", &self.length)
            .field("progress", &self.progress.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Any part a form can carry.
#[derive(Debug)]
pub enum MultipartItem {
    Bytes(ByteArrayPart),
    File(FileInfoPart),
    Stream(StreamPart),
}

impl MultipartItem {
    pub fn meta(&self) -> &PartMeta {
        match *self {
            MultipartItem::Bytes(ref p) => &p.meta,
            MultipartItem::File(ref p) => &p.meta,
            MultipartItem::Stream(ref p) => &p.meta,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.meta().name()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.meta().content_type()
    }

    pub fn file_name(&self) -> &str {
        self.meta().file_name()
    }

    /// Converts the part into its content, attaching `Content-Type` when the
    /// part has a non-empty content type.
    ///
    /// File parts are opened here; failing to open one is an `Error::Io`.
    pub async fn into_content(self) -> Result<Content, Error> {
        let (meta, mut content) = match self {
            MultipartItem::Bytes(p) => (p.meta, Content::from_bytes(p.value)),
            MultipartItem::File(p) => {
                let content = p.create_content().await?;
                (p.meta, content)
            }
            MultipartItem::Stream(p) => p.create_content(),
        };

        meta.apply_to(&mut content)?;
        Ok(content)
    }
}

impl From<ByteArrayPart> for MultipartItem {
    fn from(part: ByteArrayPart) -> Self {
        MultipartItem::Bytes(part)
    }
}

impl From<FileInfoPart> for MultipartItem {
    fn from(part: FileInfoPart) -> Self {
        MultipartItem::File(part)
    }
}

impl From<StreamPart> for MultipartItem {
    fn from(part: StreamPart) -> Self {
        MultipartItem::Stream(part)
    }
}
