//! Where per-event input comes from. Ingestion itself (tailing the Windows
//! event log, forwarding syslog, ...) is out of scope; a real deployment
//! only needs to feed events into a [`ChannelEventSource`]'s sender half.

use async_trait::async_trait;
use sentinel_common::types::LogEvent;
use tokio::sync::mpsc;

#[async_trait]
pub trait LogEventSource: Send + Sync {
    /// Returns the next event, or `None` once the source is exhausted.
    async fn next(&mut self) -> Option<LogEvent>;
}

pub struct ChannelEventSource {
    receiver: mpsc::Receiver<LogEvent>,
}

impl ChannelEventSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<LogEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl LogEventSource for ChannelEventSource {
    async fn next(&mut self) -> Option<LogEvent> {
        self.receiver.recv().await
    }
}
