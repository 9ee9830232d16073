//! Chunked serialization of a stream part with progress reporting.
//!
//! A stream part knows its length up front. It is copied to the destination
//! `min(chunk_size, remaining)` bytes at a time: each chunk is read from the
//! source, written (waiting for the destination to accept all of it), and
//! only then reported to the progress callback. Chunks never overlap and are
//! never reordered.

use std::{cmp, fmt};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{ChunkConfig, ProgressMode};
use crate::Error;

/// Progress callback, called with a percentage in `[0, 100]`.
pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

pub(crate) type Source = Box<dyn AsyncRead + Send + Unpin>;

pub(crate) struct ChunkedProgress {
    source: Source,
    length: u64,
    offset: u64,
    config: ChunkConfig,
    progress: Option<ProgressFn>,
    buffer: Vec<u8>,
}

impl ChunkedProgress {
    pub(crate) fn new(
        source: Source,
        length: u64,
        config: ChunkConfig,
        progress: Option<ProgressFn>,
    ) -> Self {
        Self {
            source,
            length,
            offset: 0,
            config,
            progress,
            buffer: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.length
    }

    /// Fills the buffer with the next chunk and returns its size,
    /// or `None` once `length` bytes have been produced.
    async fn fill_next(&mut self) -> Result<Option<usize>, Error> {
        if self.offset >= self.length {
            return Ok(None);
        }

        let want = cmp::min(self.config.chunk_size() as u64, self.length - self.offset) as usize;
        if self.buffer.len() < want {
            self.buffer.resize(want, 0);
        }

        let mut filled = 0;
        while filled < want {
            let n = self.source.read(&mut self.buffer[filled..want]).await?;
            if n == 0 {
                return Err(Error::StreamTruncated {
                    expected: self.length,
                    read: self.offset + filled as u64,
                });
            }
            filled += n;
        }

        Ok(Some(want))
    }

    /// Marks `len` bytes starting at the current offset as delivered.
    fn complete(&mut self, len: usize) {
        let start = self.offset;
        self.offset += len as u64;

        log::trace!("Chunk delivered: {}..{} of {}", start, self.offset, self.length);

        let done = match self.config.progress_mode() {
            ProgressMode::AfterChunk => self.offset,
            ProgressMode::BeforeChunk => start,
        };

        if let Some(ref mut progress) = self.progress {
            progress(100.0 * done as f64 / self.length as f64);
        }
    }

    /// Writes the whole source to `dst`, returning the number of bytes written.
    pub(crate) async fn write_to<W>(mut self, dst: &mut W) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        log::debug!(
            "Writing {} bytes in chunks of {}",
            self.length,
            self.config.chunk_size()
        );

        while let Some(n) = self.fill_next().await? {
            dst.write_all(&self.buffer[..n]).await?;
            self.complete(n);
        }

        Ok(self.offset)
    }

    /// Turns the source into a pull stream of chunks.
    ///
    /// A chunk counts as delivered when the consumer asks for the one after
    /// it, so its progress fires on that poll (or at the end of the stream).
    pub(crate) fn into_stream(self) -> BoxStream<'static, Result<Bytes, Error>> {
        stream::try_unfold((self, None), next_chunk).boxed()
    }
}

async fn next_chunk(
    (mut chunks, pending): (ChunkedProgress, Option<usize>),
) -> Result<Option<(Bytes, (ChunkedProgress, Option<usize>))>, Error> {
    if let Some(n) = pending {
        chunks.complete(n);
    }

    match chunks.fill_next().await? {
        Some(n) => {
            let chunk = Bytes::copy_from_slice(&chunks.buffer[..n]);
            Ok(Some((chunk, (chunks, Some(n)))))
        }
        None => Ok(None),
    }
}

impl fmt::Debug for ChunkedProgress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ChunkedProgress")
            .field("length", &self.length)
            .field("offset", &self.offset)
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use futures::TryStreamExt;
    use std::io::{self, Cursor};
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Event {
        Write(usize),
        Progress(f64),
    }

    pub(crate) type Log = Arc<Mutex<Vec<Event>>>;

    /// Sink accepting every write in full and logging its size.
    pub(crate) struct RecordingSink {
        log: Log,
        pub(crate) data: Vec<u8>,
    }

    impl RecordingSink {
        pub(crate) fn new(log: Log) -> Self {
            Self {
                log,
                data: Vec::new(),
            }
        }
    }

    impl AsyncWrite for RecordingSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.log.lock().unwrap().push(Event::Write(buf.len()));
            this.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    pub(crate) fn recording_progress(log: &Log) -> ProgressFn {
        let log = log.clone();
        Box::new(move |p| log.lock().unwrap().push(Event::Progress(p)))
    }

    fn known_bytes(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    fn chunks_of(data: Vec<u8>, config: ChunkConfig, log: &Log) -> ChunkedProgress {
        let length = data.len() as u64;
        ChunkedProgress::new(
            Box::new(Cursor::new(data)),
            length,
            config,
            Some(recording_progress(log)),
        )
    }

    #[tokio::test]
    async fn writes_10000_bytes_in_three_chunks() {
        let log = Log::default();
        let data = known_bytes(10_000);
        let mut sink = RecordingSink::new(log.clone());

        let written = chunks_of(data.clone(), ChunkConfig::default(), &log)
            .write_to(&mut sink)
            .await
            .expect("write_to");

        assert_eq!(10_000, written);
        assert_eq!(data, sink.data);
        assert_eq!(
            vec![
                Event::Write(4096),
                Event::Progress(40.96),
                Event::Write(4096),
                Event::Progress(81.92),
                Event::Write(1808),
                Event::Progress(100.0),
            ],
            *log.lock().unwrap()
        );
    }

    #[tokio::test]
    async fn before_chunk_mode_reports_progress_before_each_chunk() {
        let log = Log::default();
        let config = ChunkConfig::new(4096, ProgressMode::BeforeChunk).unwrap();
        let mut sink = RecordingSink::new(log.clone());

        chunks_of(known_bytes(10_000), config, &log)
            .write_to(&mut sink)
            .await
            .expect("write_to");

        let progress: Vec<f64> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();

        assert_eq!(vec![0.0, 40.96, 81.92], progress);
    }

    #[tokio::test]
    async fn empty_source_writes_nothing() {
        let log = Log::default();
        let mut sink = RecordingSink::new(log.clone());

        let written = chunks_of(Vec::new(), ChunkConfig::default(), &log)
            .write_to(&mut sink)
            .await
            .expect("write_to");

        assert_eq!(0, written);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunk_count_and_sizes_follow_chunk_size() {
        let log = Log::default();
        let config = ChunkConfig::new(1000, ProgressMode::AfterChunk).unwrap();
        let mut sink = RecordingSink::new(log.clone());

        chunks_of(known_bytes(4500), config, &log)
            .write_to(&mut sink)
            .await
            .expect("write_to");

        let events = log.lock().unwrap();
        let writes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                Event::Write(n) => Some(*n),
                _ => None,
            })
            .collect();
        let progress: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();

        assert_eq!(vec![1000, 1000, 1000, 1000, 500], writes);
        assert_eq!(5, progress.len());
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(Some(&100.0), progress.last());
    }

    #[tokio::test]
    async fn source_shorter_than_length_is_an_error() {
        let mut sink = RecordingSink::new(Log::default());
        let chunks = ChunkedProgress::new(
            Box::new(Cursor::new(known_bytes(5000))),
            10_000,
            ChunkConfig::default(),
            None,
        );

        match chunks.write_to(&mut sink).await {
            Err(Error::StreamTruncated { expected, read }) => {
                assert_eq!(10_000, expected);
                assert_eq!(5000, read);
            }
            other => panic!("Expected StreamTruncated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn source_longer_than_length_is_cut_at_length() {
        let mut sink = RecordingSink::new(Log::default());
        let chunks = ChunkedProgress::new(
            Box::new(Cursor::new(known_bytes(5000))),
            3000,
            ChunkConfig::default(),
            None,
        );

        let written = chunks.write_to(&mut sink).await.expect("write_to");

        assert_eq!(3000, written);
        assert_eq!(known_bytes(3000), sink.data);
    }

    #[tokio::test]
    async fn slow_sink_receives_bytes_in_order() {
        let data = known_bytes(20_000);
        let chunks = ChunkedProgress::new(
            Box::new(Cursor::new(data.clone())),
            data.len() as u64,
            ChunkConfig::default(),
            None,
        );

        // The duplex buffer is far smaller than a chunk, so every write waits
        // on the reader.
        let (mut client, mut server) = tokio::io::duplex(64);

        let write = async move { chunks.write_to(&mut client).await };
        let read = async move {
            let mut out = Vec::new();
            server.read_to_end(&mut out).await.map(|_| out)
        };

        let (written, received) = tokio::join!(write, read);

        assert_eq!(20_000, written.expect("write_to"));
        assert_eq!(data, received.expect("read_to_end"));
    }

    #[tokio::test]
    async fn stream_reports_chunk_once_the_next_is_requested() {
        let log = Log::default();
        let mut stream = chunks_of(known_bytes(10_000), ChunkConfig::default(), &log).into_stream();

        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(4096, first.len());
        assert!(log.lock().unwrap().is_empty());

        let second = stream.try_next().await.unwrap().unwrap();
        assert_eq!(4096, second.len());
        assert_eq!(vec![Event::Progress(40.96)], *log.lock().unwrap());

        let third = stream.try_next().await.unwrap().unwrap();
        assert_eq!(1808, third.len());

        assert!(stream.try_next().await.unwrap().is_none());
        assert_eq!(
            vec![
                Event::Progress(40.96),
                Event::Progress(81.92),
                Event::Progress(100.0)
            ],
            *log.lock().unwrap()
        );
    }
}
