use bytes::Bytes;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http::header::CONTENT_TYPE;
use http::Request;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::content::Content;
use crate::part::{MultipartItem, PartMeta};
use crate::Error;

const CRLF: &[u8] = b"\r\n";

/// Longest boundary RFC 2046 allows.
const MAX_BOUNDARY_LEN: usize = 70;

/// A multipart/form-data body under construction.
///
/// Every part is preceded by `--boundary` and a header block holding its
/// `Content-Disposition` (field name and file name) and, when the part has
/// one, its `Content-Type`. The body ends with `--boundary--`.
///
/// A part without a field name is sent under its file name.
#[derive(Debug)]
pub struct Form {
    boundary: String,
    items: Vec<MultipartItem>,
}

impl Form {
    pub fn new() -> Self {
        Self {
            boundary: gen_boundary(),
            items: Vec::new(),
        }
    }

    /// Replaces the generated boundary.
    ///
    /// The boundary must be 1 to 70 ASCII letters, digits or `'+_-.`.
    /// Fails with `InvalidArgument("boundary")` otherwise, or when it occurs
    /// in a buffered part already added.
    pub fn with_boundary<S: Into<String>>(mut self, boundary: S) -> Result<Self, Error> {
        let boundary = boundary.into();
        if !is_valid_boundary(&boundary) || self.collides(&boundary) {
            return Err(Error::invalid_argument("boundary"));
        }

        self.boundary = boundary;
        Ok(self)
    }

    /// Appends a part. If a buffered part contains the boundary, a new one
    /// is generated.
    pub fn part<P: Into<MultipartItem>>(mut self, part: P) -> Self {
        self.items.push(part.into());

        while self.collides(&self.boundary) {
            log::debug!("Boundary {:?} found in a part, regenerating", self.boundary);
            self.boundary = gen_boundary();
        }

        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn items(&self) -> &[MultipartItem] {
        &self.items
    }

    /// The `Content-Type` of the whole body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Only byte parts can be searched; files and streams are not read
    /// ahead of time.
    fn collides(&self, boundary: &str) -> bool {
        let delimiter = format!("--{}", boundary);

        self.items.iter().any(|item| match *item {
            MultipartItem::Bytes(ref p) => {
                twoway::find_bytes(p.value(), delimiter.as_bytes()).is_some()
            }
            _ => false,
        })
    }

    /// Writes the whole body to `dst`, converting one part at a time.
    /// Returns the number of bytes written.
    pub async fn write_to<W>(self, dst: &mut W) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;

        for item in self.items {
            let meta = item.meta().clone();
            let content = item.into_content().await?;

            let head = encode_head(&self.boundary, &meta, &content);
            dst.write_all(&head).await?;
            written += head.len() as u64;

            written += content.write_to(dst).await?;

            dst.write_all(CRLF).await?;
            written += CRLF.len() as u64;
        }

        let tail = encode_tail(&self.boundary);
        dst.write_all(&tail).await?;
        dst.flush().await?;

        Ok(written + tail.len() as u64)
    }

    /// The body as a lazy stream. Parts are converted (and files opened)
    /// only when the stream reaches them.
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, Error>> {
        let boundary = self.boundary;
        let tail = encode_tail(&boundary);

        stream::iter(self.items)
            .then(move |item| {
                let boundary = boundary.clone();
                async move { part_stream(&boundary, item).await }
            })
            .try_flatten()
            .chain(stream::once(future::ready(Ok(tail))))
            .boxed()
    }

    pub fn into_body(self) -> hyper::Body {
        hyper::Body::wrap_stream(self.into_stream())
    }

    /// Finishes `builder` with this form as its body and its `Content-Type`.
    pub fn into_request(
        self,
        builder: http::request::Builder,
    ) -> Result<Request<hyper::Body>, Error> {
        let content_type = self.content_type();

        builder
            .header(CONTENT_TYPE, content_type)
            .body(self.into_body())
            .map_err(Error::from)
    }
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

async fn part_stream(
    boundary: &str,
    item: MultipartItem,
) -> Result<BoxStream<'static, Result<Bytes, Error>>, Error> {
    let meta = item.meta().clone();
    let content = item.into_content().await?;
    let head = encode_head(boundary, &meta, &content);

    Ok(stream::once(future::ready(Ok(head)))
        .chain(content.into_stream())
        .chain(stream::once(future::ready(Ok(Bytes::from_static(CRLF)))))
        .boxed())
}

fn encode_head(boundary: &str, meta: &PartMeta, content: &Content) -> Bytes {
    let mut buf = Vec::with_capacity(128);

    buf.extend_from_slice(b"--");
    buf.extend_from_slice(boundary.as_bytes());
    buf.extend_from_slice(CRLF);

    buf.extend_from_slice(b"Content-Disposition: form-data; name=\"");
    buf.extend_from_slice(escape(meta.name().unwrap_or(meta.file_name())).as_bytes());
    buf.extend_from_slice(b"\"; filename=\"");
    buf.extend_from_slice(escape(meta.file_name()).as_bytes());
    buf.extend_from_slice(b"\"");

    for (name, value) in content.headers() {
        buf.extend_from_slice(CRLF);
        if *name == CONTENT_TYPE {
            buf.extend_from_slice(b"Content-Type");
        } else {
            buf.extend_from_slice(name.as_str().as_bytes());
        }
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
    }

    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(CRLF);
    buf.into()
}

fn encode_tail(boundary: &str) -> Bytes {
    format!("--{}--\r\n", boundary).into()
}

/// Percent-escapes the characters that would end a quoted parameter or
/// the header line, the way browsers encode form field names. Backslash is
/// escaped too so receivers reading quoted-pairs see the closing quote.
fn escape(value: &str) -> String {
    value
        .replace('\\', "%5C")
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn is_valid_boundary(boundary: &str) -> bool {
    // The RFC 2046 characters that need no quoting in the header parameter.
    const SPECIALS: &[u8] = b"'+_-.";

    !boundary.is_empty()
        && boundary.len() <= MAX_BOUNDARY_LEN
        && boundary
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || SPECIALS.contains(&b))
}

fn gen_boundary() -> String {
    let a = fast_random();
    let b = fast_random();
    let c = fast_random();
    let d = fast_random();

    format!("{:016x}-{:016x}-{:016x}-{:016x}", a, b, c, d)
}

/// xorshift64* seeded per thread from `RandomState`. Not for cryptography.
fn fast_random() -> u64 {
    use std::cell::Cell;
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::num::Wrapping;

    thread_local! {
        static RNG: Cell<Wrapping<u64>> = Cell::new(Wrapping(seed()));
    }

    fn seed() -> u64 {
        let seed = RandomState::new();

        let mut out = 0;
        let mut cnt = 0;
        while out == 0 {
            cnt += 1;
            let mut hasher = seed.build_hasher();
            hasher.write_usize(cnt);
            out = hasher.finish();
        }
        out
    }

    RNG.with(|rng| {
        let mut n = rng.get();
        n ^= n >> 12;
        n ^= n << 25;
        n ^= n >> 27;
        rng.set(n);
        n.0.wrapping_mul(0x2545_f491_4f6c_dd1d)
    })
}
