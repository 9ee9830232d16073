use std::{cmp, fmt};

use bytes::Bytes;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::progress::ChunkedProgress;
use crate::Error;

/// The body of a single part plus its headers, ready to be written out or
/// handed to hyper.
///
/// A `Content` owns whatever its part carried: the buffer, the opened file
/// or the stream source. Dropping it releases them.
pub struct Content {
    headers: HeaderMap,
    body: ContentBody,
}

enum ContentBody {
    Bytes(Bytes),
    File { file: File, len: u64 },
    Stream(ChunkedProgress),
}

impl Content {
    pub(crate) fn from_bytes(bytes: Bytes) -> Self {
        Self::with_body(ContentBody::Bytes(bytes))
    }

    pub(crate) fn from_file(file: File, len: u64) -> Self {
        Self::with_body(ContentBody::File { file, len })
    }

    pub(crate) fn from_stream(chunks: ChunkedProgress) -> Self {
        Self::with_body(ContentBody::Stream(chunks))
    }

    fn with_body(body: ContentBody) -> Self {
        Self {
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Content-Type` header, if one was set and is valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|hv| hv.to_str().ok())
    }

    pub(crate) fn set_content_type(&mut self, content_type: &str) -> Result<(), Error> {
        let value = HeaderValue::from_str(content_type)?;
        self.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }

    /// Number of body bytes this content produces.
    pub fn content_length(&self) -> u64 {
        match self.body {
            ContentBody::Bytes(ref bytes) => bytes.len() as u64,
            ContentBody::File { len, .. } => len,
            ContentBody::Stream(ref chunks) => chunks.len(),
        }
    }

    /// Writes the body to `dst` and flushes it. Returns the number of bytes
    /// written.
    pub async fn write_to<W>(self, dst: &mut W) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let written = match self.body {
            ContentBody::Bytes(bytes) => {
                dst.write_all(&bytes).await?;
                bytes.len() as u64
            }
            ContentBody::File { mut file, .. } => tokio::io::copy(&mut file, dst).await?,
            ContentBody::Stream(chunks) => chunks.write_to(dst).await?,
        };

        dst.flush().await?;
        Ok(written)
    }

    /// The body as a stream of chunks, read lazily.
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, Error>> {
        match self.body {
            ContentBody::Bytes(bytes) if bytes.is_empty() => stream::empty().boxed(),
            ContentBody::Bytes(bytes) => stream::once(future::ready(Ok(bytes))).boxed(),
            ContentBody::File { file, .. } => ReaderStream::with_capacity(file, DEFAULT_CHUNK_SIZE)
                .map_err(Error::from)
                .boxed(),
            ContentBody::Stream(chunks) => chunks.into_stream(),
        }
    }

    pub fn into_body(self) -> hyper::Body {
        hyper::Body::wrap_stream(self.into_stream())
    }

    /// Reads the whole body into memory.
    ///
    /// A stream's length is only what its part declared, so the buffer
    /// grows as bytes arrive.
    pub async fn into_bytes(self) -> Result<Bytes, Error> {
        let cap = cmp::min(self.content_length(), DEFAULT_CHUNK_SIZE as u64) as usize;
        let mut buf: Vec<u8> = Vec::with_capacity(cap);
        self.write_to(&mut buf).await?;
        Ok(buf.into())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.body {
            ContentBody::Bytes(_) => "bytes",
            ContentBody::File { .. } => "file",
            ContentBody::Stream(_) => "stream",
        };

        f.debug_struct("Content")
            .field("headers", &self.headers)
            .field("body", &kind)
            .field("content_length", &self.content_length())
            .finish()
    }
}
