use super::{BusError, MessageStream, SessionBus};
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

const DEFAULT_CAPACITY: usize = 256;

/// In-process bus (single-instance deployments and tests)
pub struct LocalBus {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Per-channel buffer; a subscriber lagging further behind loses messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of channels with live or recently live subscribers
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionBus for LocalBus {
    async fn publish(&self, channel: &str, message: String) -> Result<usize, BusError> {
        let sender = match self.channels.get(channel) {
            Some(sender) => sender.clone(),
            None => return Ok(0),
        };

        match sender.send(message) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                // Nobody listening any more
                self.channels
                    .remove_if(channel, |_, s| s.receiver_count() == 0);
                Ok(0)
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        let receiver = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(message) => Some(message),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %channel, skipped, "Bus subscriber lagged, messages dropped");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
