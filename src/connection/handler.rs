// src/connection/handler.rs

//! Defines the `ConnectionHandler` seam and the placeholder handler the binary runs.

use super::context::ConnectionContext;
use crate::core::BrokerError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Owns the protocol side of a connection: the handshake, authentication via
/// [`ConnectionContext::authenticate`], and everything after it.
///
/// The acceptor runs each call on its own task. Returning, failing, or
/// panicking all drop the context, which removes the connection from the
/// registry.
#[async_trait]
pub trait ConnectionHandler<S: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, ctx: ConnectionContext<S>) -> Result<(), BrokerError>;
}

/// Holds a connection open, discarding anything the peer sends, until the
/// peer disconnects or the server asks it to close.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoldHandler;

#[async_trait]
impl<S> ConnectionHandler<S> for HoldHandler
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn handle(&self, mut ctx: ConnectionContext<S>) -> Result<(), BrokerError> {
        let id = ctx.id();
        let addr = ctx.remote_addr();
        let (stream, signal) = ctx.io();
        let mut buf = [0u8; 4096];

        loop {
            tokio::select! {
                biased;
                _ = signal.recv() => {
                    info!("Connection {} from {} asked to close.", id, addr);
                    break;
                }
                result = stream.read(&mut buf) => match result {
                    Ok(0) => {
                        debug!("Connection {} from {} closed by peer.", id, addr);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) if is_normal_disconnect(&e) => {
                        debug!("Connection {} from {} closed by peer: {}", id, addr, e);
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let _ = stream.shutdown().await;
        Ok(())
    }
}

fn is_normal_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    )
}
