use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use stepexec::exec::{Channel, LineSink, OutputLine, SinkClosed};

/// A `LineSink` that keeps every delivered line.
///
/// With [`closing_after`](Self::closing_after) it accepts a fixed number of
/// lines and then reports itself closed, like a client that disconnected.
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<OutputLine>>>,
    limit: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closing_after(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines.lock().unwrap().clone()
    }

    /// Text of the lines seen on `channel`, in delivery order.
    pub fn texts(&self, channel: Channel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.channel == channel)
            .map(|l| l.text)
            .collect()
    }

    /// What a capture buffer for `channel` should look like.
    pub fn joined(&self, channel: Channel) -> String {
        self.texts(channel).into_iter().map(|t| t + "\n").collect()
    }
}

impl LineSink for RecordingSink {
    fn deliver(
        &self,
        line: OutputLine,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkClosed>> + Send + '_>> {
        let mut lines = self.lines.lock().unwrap();
        let accepted = match self.limit {
            Some(limit) if lines.len() >= limit => Err(SinkClosed),
            _ => {
                lines.push(line);
                Ok(())
            }
        };
        Box::pin(std::future::ready(accepted))
    }
}
