use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf, Result as IoResult};

/// This pattern abstracts "why reading stops" into a future. It is used for shutdowns: an
/// interactive ingest blocked on a terminal read ends as soon as the run is cancelled.
///
/// Any stop condition is treated as an EOF. See [this code](https://github.com/vectordotdev/vector/blob/master/src/async_read.rs)
pub trait StopReadExt: AsyncRead {
    fn read_until_stopped<F>(self, stop: F) -> ReadUntil<Self, F>
    where
        Self: Sized,
        F: Future<Output = ()>,
    {
        ReadUntil { reader: self, stop }
    }
}

impl<S> StopReadExt for S where S: AsyncRead {}

/// Reader returned by [`StopReadExt::read_until_stopped`].
#[pin_project]
#[derive(Debug)]
pub struct ReadUntil<S, F> {
    #[pin]
    reader: S,
    #[pin]
    stop: F,
}

impl<S, F> AsyncRead for ReadUntil<S, F>
where
    S: AsyncRead,
    F: Future<Output = ()>,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        let this = self.project();

        match this.stop.poll(cx) {
            Poll::Ready(_) => Poll::Ready(Ok(())),
            Poll::Pending => this.reader.poll_read(cx, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn should_read_through_until_stopped() {
        let token = CancellationToken::new();
        let mut reader = std::pin::pin!((&b"abc"[..]).read_until_stopped(token.clone().cancelled_owned()));

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();

        assert_eq!(out, "abc");
    }

    #[tokio::test]
    async fn should_report_eof_once_stopped() {
        let (_writer, pipe) = tokio::io::duplex(64);
        let token = CancellationToken::new();
        let mut reader = std::pin::pin!(pipe.read_until_stopped(token.clone().cancelled_owned()));
        token.cancel();

        let mut buf = [0u8; 8];
        let n = reader.read(&mut buf).await.unwrap();

        assert_eq!(n, 0);
    }
}
