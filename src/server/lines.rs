//! Line channel over a child process output stream.
//!
//! Splits a raw byte stream into newline-delimited text lines. Lines may
//! arrive split across any number of underlying reads; they are buffered
//! until the delimiter is seen. A trailing fragment with no delimiter is
//! discarded when the stream closes, since the protocol is line-oriented.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads newline-delimited lines from a byte stream.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a raw byte stream.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Read the next complete line with its `\n` (and any `\r`) stripped.
    ///
    /// Returns `Ok(None)` once the stream is closed. Invalid UTF-8 is
    /// replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&b'\n') {
            tracing::debug!(
                bytes = self.buf.len(),
                "Stream closed mid-line, discarding partial line"
            );
            self.buf.clear();
            return Ok(None);
        }

        self.buf.pop();
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Convert into a stream of lines that ends when the source closes.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = io::Result<String>> {
        futures_util::stream::unfold(self, |mut reader| async move {
            match reader.next_line().await {
                Ok(Some(line)) => Some((Ok(line), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
    }
}
