//! ``src/controller/event_loop.rs``
//! ============================================================================
//! # Event Loop: the consumer side of every background channel
//!
//! Background scans, previews and bulk operations never mutate navigator
//! state. They send messages here; the foreground task pulls `NavUpdate`
//! values out of the `EventLoop` and hands each to `Navigator::apply`, which
//! makes the navigator the single writer of its caches and counters.

use std::fmt;

use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tracing::{info, trace};

use crate::model::directory::Directory;
use crate::tasks::preview_task::{Preview, PreviewRequest};

/// Capacity of the progress delta channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 1024;

/// Signed progress adjustments. Totals are published `+n` when an operation
/// starts and retracted `-n` when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDelta {
    CopyBytes(i64),
    CopyTotal(i64),
    MoveCount(i64),
    MoveTotal(i64),
    DeleteCount(i64),
    DeleteTotal(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A message for the user, such as a numbered bulk-operation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NotificationLevel::Info => write!(f, "{}", self.message),
            NotificationLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Requests that background tasks make of the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    Notify(Notification),

    /// Re-validate every open directory and prune vanished selections.
    Renew,
}

/// One unit of work for `Navigator::apply`.
#[derive(Debug)]
pub enum NavUpdate {
    Directory(Directory),
    Preview(Preview),
    Progress(ProgressDelta),
    Event(NavEvent),
}

/// Sending halves, owned by the navigator and cloned into tasks.
#[derive(Debug, Clone)]
pub struct NavSenders {
    pub dir_tx: UnboundedSender<Directory>,
    pub preview_tx: UnboundedSender<Preview>,
    pub progress_tx: Sender<ProgressDelta>,
    pub event_tx: UnboundedSender<NavEvent>,
    pub preview_req_tx: UnboundedSender<PreviewRequest>,
}

pub struct EventLoop {
    dir_rx: UnboundedReceiver<Directory>,
    preview_rx: UnboundedReceiver<Preview>,
    progress_rx: Receiver<ProgressDelta>,
    event_rx: UnboundedReceiver<NavEvent>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop").finish_non_exhaustive()
    }
}

impl EventLoop {
    /// Create every channel. The preview request receiver goes to the preview worker.
    pub fn channels() -> (NavSenders, UnboundedReceiver<PreviewRequest>, Self) {
        let (dir_tx, dir_rx) = mpsc::unbounded_channel();
        let (preview_tx, preview_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (preview_req_tx, preview_req_rx) = mpsc::unbounded_channel();

        let senders: NavSenders = NavSenders {
            dir_tx,
            preview_tx,
            progress_tx,
            event_tx,
            preview_req_tx,
        };
        let event_loop: Self = Self {
            dir_rx,
            preview_rx,
            progress_rx,
            event_rx,
        };

        (senders, preview_req_rx, event_loop)
    }

    /// Wait for the next update from any channel; `None` once all are closed.
    pub async fn next(&mut self) -> Option<NavUpdate> {
        let update: Option<NavUpdate> = tokio::select! {
            Some(dir) = self.dir_rx.recv() => Some(NavUpdate::Directory(dir)),
            Some(preview) = self.preview_rx.recv() => Some(NavUpdate::Preview(preview)),
            Some(delta) = self.progress_rx.recv() => Some(NavUpdate::Progress(delta)),
            Some(event) = self.event_rx.recv() => Some(NavUpdate::Event(event)),
            else => {
                info!("Event loop terminated - all channels closed");
                None
            }
        };

        trace!("Event loop update: {:?}", update);
        update
    }

    /// Non-blocking variant used to flush whatever is already queued.
    pub fn try_next(&mut self) -> Option<NavUpdate> {
        if let Ok(dir) = self.dir_rx.try_recv() {
            return Some(NavUpdate::Directory(dir));
        }
        if let Ok(preview) = self.preview_rx.try_recv() {
            return Some(NavUpdate::Preview(preview));
        }
        if let Ok(delta) = self.progress_rx.try_recv() {
            return Some(NavUpdate::Progress(delta));
        }
        if let Ok(event) = self.event_rx.try_recv() {
            return Some(NavUpdate::Event(event));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_delivers_from_every_channel() {
        let (senders, _req_rx, mut event_loop) = EventLoop::channels();

        senders.progress_tx.send(ProgressDelta::CopyTotal(10)).await.unwrap();
        senders.event_tx.send(NavEvent::Renew).unwrap();

        let mut seen: Vec<String> = Vec::new();
        for _ in 0..2 {
            match event_loop.next().await {
                Some(NavUpdate::Progress(d)) => seen.push(format!("{d:?}")),
                Some(NavUpdate::Event(e)) => seen.push(format!("{e:?}")),
                other => panic!("unexpected update {other:?}"),
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["CopyTotal(10)", "Renew"]);
        assert!(event_loop.try_next().is_none());
    }

    #[tokio::test]
    async fn test_next_ends_when_senders_drop() {
        let (senders, _req_rx, mut event_loop) = EventLoop::channels();
        drop(senders);

        assert!(event_loop.next().await.is_none());
    }

    #[test]
    fn test_notification_display() {
        assert_eq!(Notification::error("[1] boom").to_string(), "error: [1] boom");
        assert_eq!(Notification::info("Copied successfully").to_string(), "Copied successfully");
    }
}
