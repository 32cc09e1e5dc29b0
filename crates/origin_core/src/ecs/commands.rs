//! # Command Queue
//!
//! Bounded queue for mutations prepared outside the tick (network threads,
//! loaders). Commands are closures over `&mut World`, applied in FIFO order
//! at the start of the next [`World::update`].

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::world::World;
use crate::error::{CoreError, CoreResult};

/// Deferred world mutation.
pub type Command = Box<dyn FnOnce(&mut World) + Send>;

/// Cloneable producer handle for a world's command queue.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
    capacity: usize,
}

impl CommandSender {
    /// Enqueues `command` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CommandQueueFull`] when the queue is at capacity
    /// and [`CoreError::WorldGone`] when the world has been dropped.
    pub fn send(&self, command: impl FnOnce(&mut World) + Send + 'static) -> CoreResult<()> {
        self.tx.try_send(Box::new(command)).map_err(|err| match err {
            TrySendError::Full(_) => {
                tracing::warn!(capacity = self.capacity, "command queue full, command dropped");
                CoreError::CommandQueueFull {
                    capacity: self.capacity,
                }
            }
            TrySendError::Disconnected(_) => CoreError::WorldGone,
        })
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Checks whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("queued", &self.tx.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// World-owned end of the queue.
pub(crate) struct CommandQueue {
    sender: CommandSender,
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            sender: CommandSender { tx, capacity },
            rx,
        }
    }

    pub(crate) fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn try_pop(&self) -> Option<Command> {
        self.rx.try_recv().ok()
    }
}
