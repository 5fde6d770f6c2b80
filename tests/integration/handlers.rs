// tests/integration/handlers.rs

//! Connection handlers used by the integration tests.

use async_trait::async_trait;
use brokerd::connection::{ConnectionContext, ConnectionHandler, HoldHandler};
use brokerd::core::BrokerError;
use brokerd::core::auth::SaslCredential;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Reads one `username:password` line, answers `OK` or `NO`, and on success
/// holds the connection like `HoldHandler`.
pub struct LineAuthHandler;

#[async_trait]
impl<S> ConnectionHandler<S> for LineAuthHandler
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn handle(&self, mut ctx: ConnectionContext<S>) -> Result<(), BrokerError> {
        let line = {
            let mut reader = BufReader::new(ctx.stream_mut());
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            line
        };
        let line = line.trim_end();
        let (username, password) = line.split_once(':').unwrap_or((line, ""));

        let accepted = ctx
            .authenticate(SaslCredential::new(username, password))
            .await;
        let reply: &[u8] = if accepted { b"OK\n" } else { b"NO\n" };
        ctx.stream_mut().write_all(reply).await?;

        if !accepted {
            return Err(BrokerError::Handler(format!(
                "authentication failed for '{username}'"
            )));
        }
        ConnectionHandler::<S>::handle(&HoldHandler, ctx).await
    }
}

/// Panics as soon as it gets a connection.
pub struct PanicHandler;

#[async_trait]
impl<S> ConnectionHandler<S> for PanicHandler
where
    S: Send + 'static,
{
    async fn handle(&self, ctx: ConnectionContext<S>) -> Result<(), BrokerError> {
        let _ctx = ctx;
        panic!("handler failed on purpose");
    }
}
