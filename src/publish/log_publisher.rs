//! Publisher that writes one JSON line per message to stdout.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Channel, Message, PublishError, Publisher};

#[derive(Default)]
pub struct LogPublisher {
    published: AtomicU64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn format_line(channel: Channel, message: &Message) -> Result<String, PublishError> {
        Ok(format!("{} {}", channel, message.to_json()?))
    }
}

impl Publisher for LogPublisher {
    fn publish(&self, channel: Channel, message: &Message) -> Result<(), PublishError> {
        let line = Self::format_line(channel, message)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;

        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
