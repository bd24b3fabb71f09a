//! Per-connection chunk loop.
//!
//! For every `\r`-terminated chunk: process, dispatch if accepted, then
//! reply. The reply never waits for a sink; dispatch only spawns tasks.
//! Chunks are handled strictly one at a time, so replies leave in the order
//! their frames arrived.

use crate::server::ReceiverContext;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use siaip_core::{Error, Verdict};
use siaip_protocol::{Processed, ResponseFrame, SiaCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Serves one panel connection until it closes.
pub struct ConnectionHandler<T = TcpStream> {
    framed: Framed<T, SiaCodec>,
    peer: SocketAddr,
    context: Arc<ReceiverContext>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> ConnectionHandler<T> {
    pub fn new(
        stream: T,
        peer: SocketAddr,
        context: Arc<ReceiverContext>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            framed: Framed::new(stream, SiaCodec::with_max_frame_size(max_frame_size)),
            peer,
            context,
        }
    }

    /// Read chunks until EOF, a framing error or a failed write.
    pub async fn run(mut self) {
        info!(peer = %self.peer, "Panel connected");

        while let Some(item) = self.framed.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Closing connection");
                    break;
                }
            };

            let Some(reply) = self.handle_chunk(&chunk) else {
                continue;
            };
            if let Err(e) = self.framed.send(reply).await {
                warn!(peer = %self.peer, error = %e, "Failed to send reply");
                break;
            }
        }

        info!(peer = %self.peer, "Panel disconnected");
    }

    /// Reply for one chunk, or `None` when the chunk is dropped silently.
    fn handle_chunk(&self, chunk: &[u8]) -> Option<ResponseFrame> {
        match self.context.processor.process(chunk, Utc::now()) {
            Ok(Processed {
                event,
                verdict,
                response,
            }) => {
                match verdict {
                    Verdict::Accept => {
                        info!(
                            peer = %self.peer,
                            account = %event.account,
                            sequence = %event.sequence,
                            signal = %event.signal,
                            drift = event.timestamps.drift_seconds,
                            "ACK"
                        );
                        self.context.dispatcher.dispatch(event);
                    }
                    Verdict::Reject => {
                        warn!(
                            peer = %self.peer,
                            account = %event.account,
                            drift = event.timestamps.drift_seconds,
                            "NAK: panel clock outside accepted window"
                        );
                    }
                }
                Some(response)
            }
            Err(Error::RejectedAccount { account }) => {
                debug!(peer = %self.peer, %account, "Blacklisted account, frame dropped");
                None
            }
            Err(e @ (Error::DecryptFailure(_) | Error::UnsupportedKey { .. })) => {
                warn!(peer = %self.peer, error = %e, "No usable data");
                None
            }
            Err(e) => {
                info!(peer = %self.peer, error = %e, "Chunk dropped");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siaip_core::{Blacklist, CodeCatalog, DriftWindow};
    use siaip_protocol::{FrameProcessor, LocalZone, PanelFrame, TimestampReconciler};
    use siaip_storage::{DiagnosticFormat, DiagnosticSink, Dispatcher};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    const KEY: &[u8] = b"0123456789abcdef";

    fn context() -> Arc<ReceiverContext> {
        let processor = FrameProcessor::new(
            KEY,
            Arc::new(CodeCatalog::default()),
            Arc::new(["9999"].into_iter().collect::<Blacklist>()),
            TimestampReconciler::new(LocalZone::System, DriftWindow::default()),
        );
        let dispatcher = Dispatcher::new().with_diagnostic(DiagnosticSink::new(DiagnosticFormat::Json));
        ReceiverContext::new(processor, dispatcher)
    }

    fn frame(account: &str, sequence: &str) -> String {
        PanelFrame::new(account)
            .sequence(sequence)
            .signal("NOP001")
            .timestamp(Utc::now().naive_utc())
            .encode(KEY)
            .unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_replies_in_order_and_skips_dropped_chunks() {
        let (mut panel, server) = duplex(4096);
        let context = context();
        let mut events = context.dispatcher.subscribe().unwrap();
        let task = tokio::spawn(ConnectionHandler::new(server, peer(), context, 4096).run());

        let mut wire = frame("1234", "0001");
        wire.push_str("\ngarbage\r");
        wire.push_str(&frame("9999", "0002"));
        wire.push_str(&frame("5678", "0003"));
        panel.write_all(wire.as_bytes()).await.unwrap();
        panel.shutdown().await.unwrap();

        let mut replies = String::new();
        panel.read_to_string(&mut replies).await.unwrap();
        task.await.unwrap();

        let bodies: Vec<_> = replies
            .split_terminator('\r')
            .map(|reply| ResponseFrame::parse(reply.as_bytes()).unwrap())
            .collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].body(), "\"ACK\"0001L01234[]");
        assert_eq!(bodies[1].body(), "\"ACK\"0003L05678[]");

        // Sink tasks may finish in any order
        let mut accounts = vec![
            events.recv().await.unwrap().account.clone(),
            events.recv().await.unwrap().account.clone(),
        ];
        accounts.sort();
        assert_eq!(accounts, ["1234", "5678"]);
    }

    #[tokio::test]
    async fn test_oversized_chunk_closes_connection() {
        let (mut panel, server) = duplex(4096);
        let task = tokio::spawn(ConnectionHandler::new(server, peer(), context(), 16).run());

        panel.write_all(&[b'A'; 64]).await.unwrap();

        let mut rest = Vec::new();
        panel.read_to_end(&mut rest).await.unwrap();
        task.await.unwrap();
        assert!(rest.is_empty());
    }
}
