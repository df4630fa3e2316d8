//! Action Channel carrying input events into the session loop

use anyhow::Result;
use tokio::sync::mpsc;

use crate::session::command_router::InteractiveCommand;

/// Events delivered to the session loop from outside it
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Parsed user command
    UserCommand { command: InteractiveCommand },
    /// Input that could not be parsed
    Error { message: String },
    /// Input stream ended
    InputClosed,
    /// Shutdown request
    ShutdownRequested,
}

/// Action channel for event processing
pub struct ActionChannel {
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl Clone for ActionChannel {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            event_rx: None, // Receivers cannot be cloned
        }
    }
}

impl ActionChannel {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Send event to channel
    pub fn send_event(&self, event: SessionEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))
    }

    /// Send a parsed command
    pub fn send_command(&self, command: InteractiveCommand) -> Result<()> {
        self.send_event(SessionEvent::UserCommand { command })
    }

    /// Send shutdown request
    pub fn request_shutdown(&self) -> Result<()> {
        self.send_event(SessionEvent::ShutdownRequested)
    }

    /// Get next event; `None` on clones, which only send
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match &mut self.event_rx {
            Some(event_rx) => event_rx.recv().await,
            None => None,
        }
    }
}

impl Default for ActionChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_sends_to_original() {
        let mut channel = ActionChannel::new();
        let sender = channel.clone();

        sender.send_command(InteractiveCommand::Status).unwrap();
        sender.request_shutdown().unwrap();

        assert_eq!(
            channel.next_event().await,
            Some(SessionEvent::UserCommand {
                command: InteractiveCommand::Status
            })
        );
        assert_eq!(channel.next_event().await, Some(SessionEvent::ShutdownRequested));
    }

    #[test]
    fn test_next_event_waits_on_owner_only() {
        let mut channel = ActionChannel::new();
        let mut sender = channel.clone();

        let mut cloned = tokio_test::task::spawn(sender.next_event());
        tokio_test::assert_ready_eq!(cloned.poll(), None);

        let mut owned = tokio_test::task::spawn(channel.next_event());
        tokio_test::assert_pending!(owned.poll());
    }
}
