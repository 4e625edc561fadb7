use async_trait::async_trait;
use null_term_ipc::{
    ActionResult, ChannelClient, ChannelEvent, ClientError, ResizeResult, SpawnParams, SpawnResult,
};
use tokio::sync::mpsc;

/// The session manager's view of the host channel.
#[async_trait]
pub trait TerminalTransport: Send + Sync {
    async fn spawn(&self, params: &SpawnParams) -> Result<SpawnResult, ClientError>;

    async fn write(&self, id: &str, data: &str) -> Result<ActionResult, ClientError>;

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<ResizeResult, ClientError>;

    async fn kill(&self, id: &str) -> Result<ActionResult, ClientError>;

    /// Routes `data`/`exit` events for `id` to the returned receiver.
    /// Idempotent per `consumer`: a second call replaces the first receiver.
    fn subscribe(&self, id: &str, consumer: &str) -> mpsc::UnboundedReceiver<ChannelEvent>;

    /// Stops `consumer`'s events for `id` without touching other consumers.
    fn unsubscribe(&self, id: &str, consumer: &str) -> bool;
}

#[async_trait]
impl TerminalTransport for ChannelClient {
    async fn spawn(&self, params: &SpawnParams) -> Result<SpawnResult, ClientError> {
        ChannelClient::spawn(self, params).await
    }

    async fn write(&self, id: &str, data: &str) -> Result<ActionResult, ClientError> {
        ChannelClient::write(self, id, data).await
    }

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<ResizeResult, ClientError> {
        ChannelClient::resize(self, id, cols, rows).await
    }

    async fn kill(&self, id: &str) -> Result<ActionResult, ClientError> {
        ChannelClient::kill(self, id).await
    }

    fn subscribe(&self, id: &str, consumer: &str) -> mpsc::UnboundedReceiver<ChannelEvent> {
        ChannelClient::subscribe(self, id, consumer)
    }

    fn unsubscribe(&self, id: &str, consumer: &str) -> bool {
        ChannelClient::unsubscribe(self, id, consumer)
    }
}
