mod tcp;

pub use tcp::{TcpSession, TcpSessionFactory};

use crate::error::SessionError;
use crate::pipeline::RecordHandler;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One lifetime of group membership against a fixed topic list.
#[async_trait]
pub trait BrokerSession: Send {
    /// Drives the handler until `cancel` fires or the session fails.
    ///
    /// Returns `Ok(())` only on cancellation.
    async fn consume(
        &mut self,
        cancel: &CancellationToken,
        topics: &[String],
        handler: &mut RecordHandler<'_>,
    ) -> Result<(), SessionError>;

    /// Releases group membership. Called exactly once, after `consume` returns.
    async fn close(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn BrokerSession>, SessionError>;
}
