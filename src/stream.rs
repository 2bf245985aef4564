use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

/// PATCH request body handed to [`UploadStore::upload`](crate::UploadStore::upload).
///
/// Implements [`Stream`] and [`Body`]. Yields at most `limit` bytes, the
/// space left in the upload. Anything past that ends the stream with an
/// [`io::ErrorKind::InvalidData`] error.
#[pin_project]
pub struct UploadStream {
    received: u64,
    limit: u64,
    exhausted: bool,
    #[pin]
    body: AxumBody,
}

impl UploadStream {
    pub fn new(body: impl Into<AxumBody>, limit: u64) -> Self {
        UploadStream { received: 0, limit, exhausted: false, body: body.into() }
    }

    /// Bytes yielded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Bytes that may still be yielded before the limit is hit.
    pub fn remaining(&self) -> u64 {
        self.limit - self.received
    }
}

impl std::fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadStream")
            .field("received", &self.received)
            .field("limit", &self.limit)
            .finish()
    }
}

impl Stream for UploadStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if *this.exhausted {
            return Poll::Ready(None);
        }

        loop {
            let frame = match this.body.as_mut().poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    *this.exhausted = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.exhausted = true;
                    return Poll::Ready(Some(Err(io::Error::other(e))));
                }
                Poll::Ready(Some(Ok(frame))) => frame,
            };

            // trailers
            let Ok(data) = frame.into_data() else { continue };

            let received = *this.received + data.len() as u64;
            if received > *this.limit {
                *this.exhausted = true;
                return Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("body exceeds the remaining upload length of {} bytes", *this.limit - *this.received),
                ))));
            }

            *this.received = received;
            return Poll::Ready(Some(Ok(data)));
        }
    }
}

impl Body for UploadStream {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        let mut hint = SizeHint::new();
        hint.set_upper(self.remaining());
        hint
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{pin_mut, StreamExt};

    async fn collect(stream: UploadStream) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose()? {
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    #[tokio::test]
    async fn test_yields_body() {
        let stream = UploadStream::new("hello world", 100);
        assert_eq!(b"hello world".to_vec(), collect(stream).await.unwrap());
    }

    #[tokio::test]
    async fn test_exact_limit() {
        let stream = UploadStream::new("hello", 5);
        assert_eq!(b"hello".to_vec(), collect(stream).await.unwrap());
    }

    #[tokio::test]
    async fn test_over_limit() {
        let stream = UploadStream::new("hello world", 5);
        let err = collect(stream).await.unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
    }

    #[tokio::test]
    async fn test_counts_received() {
        let mut stream = UploadStream::new(Bytes::from_static(b"abc"), 10);
        assert_eq!(10, stream.remaining());
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&b"abc"[..], &chunk[..]);
        assert_eq!(3, stream.received());
        assert_eq!(7, stream.remaining());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
