use super::{BusError, MessageStream, SessionBus};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Redis pub/sub bus, shared by every instance pointed at the same server
pub struct RedisBus {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisBus {
    /// Connect to the given `redis://` URL
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        tracing::info!("Connected session bridge to Redis");

        Ok(Self { client, publisher })
    }
}

#[async_trait::async_trait]
impl SessionBus for RedisBus {
    async fn publish(&self, channel: &str, message: String) -> Result<usize, BusError> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, usize>(channel, message)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });

        Ok(stream.boxed())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
