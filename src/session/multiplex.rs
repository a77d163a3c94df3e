// ABOUTME: Duplicates one byte source into two independently readable copies.
// ABOUTME: A single background task reads the source and fans chunks out.

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

const CHUNK_SIZE: usize = 8 * 1024;

/// One copy of a multiplexed byte source.
///
/// Reads yield the source's bytes in order. A source read error is delivered
/// as an error after all bytes read before it; end of source, or cancellation,
/// is a clean end of stream.
pub struct MultiplexReader {
    inner: StreamReader<ChunkStream, Bytes>,
}

impl MultiplexReader {
    fn new(rx: mpsc::UnboundedReceiver<io::Result<Bytes>>) -> Self {
        Self {
            inner: StreamReader::new(ChunkStream { rx }),
        }
    }
}

impl AsyncRead for MultiplexReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

struct ChunkStream {
    rx: mpsc::UnboundedReceiver<io::Result<Bytes>>,
}

impl Stream for ChunkStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Split `source` into two readers that each see every byte.
///
/// Reading stops when the source ends, fails, or `done` is cancelled. Data
/// already read stays available to both readers after cancellation.
///
/// Library-only: the `serve` binary hands the menu's unread input straight
/// to the proxy and does not split the inbound stream.
pub fn multiplex<R>(source: R, done: CancellationToken) -> (MultiplexReader, MultiplexReader)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();

    tokio::spawn(fan_out(source, [tx_a, tx_b], done));

    (MultiplexReader::new(rx_a), MultiplexReader::new(rx_b))
}

async fn fan_out<R>(
    mut source: R,
    outputs: [mpsc::UnboundedSender<io::Result<Bytes>>; 2],
    done: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = done.cancelled() => {
                tracing::debug!("multiplexer cancelled");
                return;
            }
            r = source.read(&mut buf) => r,
        };

        match read {
            Ok(0) => return,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                let mut delivered = false;
                for tx in &outputs {
                    delivered |= tx.send(Ok(chunk.clone())).is_ok();
                }
                if !delivered {
                    // Both readers are gone.
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("multiplexed source failed: {}", e);
                for tx in &outputs {
                    let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string())));
                }
                return;
            }
        }
    }
}
