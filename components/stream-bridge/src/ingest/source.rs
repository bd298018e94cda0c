// Local crates
use crate::ingest::async_read::StopReadExt;

// External crates
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

/// Argument value that selects standard input.
pub const STDIN_ARG: &str = "-";

/// Where ingested lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// `-` is standard input, anything else a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == STDIN_ARG {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(arg))
        }
    }

    /// Open the source. Reads report EOF as soon as `stop` is cancelled.
    pub async fn open(
        &self,
        stop: CancellationToken,
    ) -> io::Result<Pin<Box<dyn AsyncRead + Send>>> {
        let stopped = stop.cancelled_owned();
        Ok(match self {
            InputSource::Stdin => Box::pin(tokio::io::stdin().read_until_stopped(stopped)),
            InputSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Box::pin(file.read_until_stopped(stopped))
            }
        })
    }
}

/// Split `reader` into lines, lazily, in input order.
///
/// Only the line terminator (`\n` or `\r\n`) is removed, bytes are otherwise passed through
/// untouched, invalid UTF-8 included. A final line without terminator is still a line.
pub fn lines<R>(reader: R) -> impl Stream<Item = io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    async_stream::try_stream! {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            strip_terminator(&mut line);
            yield Bytes::from(line);
        }
    }
}

fn strip_terminator(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}
