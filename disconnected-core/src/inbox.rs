//! Hand-off of world mutations from other threads to the tick thread.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::error;
use thiserror::Error;

use crate::error::TaskError;
use crate::world::World;

pub type WorldCommand = Box<dyn FnOnce(&mut World) + Send>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("command inbox is closed")]
pub struct InboxClosed;

/// Queue of commands applied by the tick thread at the start of a tick.
#[derive(Debug)]
pub struct CommandInbox {
    sender: Sender<WorldCommand>,
    receiver: Receiver<WorldCommand>,
}

impl CommandInbox {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn handle(&self) -> InboxHandle {
        InboxHandle { sender: self.sender.clone() }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Applies every queued command in submission order. A panicking command
    /// is logged and skipped. Returns how many commands ran to completion.
    pub fn apply(&self, world: &mut World) -> usize {
        let mut applied = 0;
        for command in self.receiver.try_iter() {
            match catch_unwind(AssertUnwindSafe(|| command(world))) {
                Ok(()) => applied += 1,
                Err(payload) => error!("World command panicked: {}", TaskError::from_panic(payload)),
            }
        }
        applied
    }
}

impl Default for CommandInbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable submit side of a [`CommandInbox`], safe to move to other threads.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    sender: Sender<WorldCommand>,
}

impl InboxHandle {
    pub fn submit<F>(&self, command: F) -> Result<(), InboxClosed>
    where
        F: FnOnce(&mut World) + Send + 'static,
    {
        self.sender.send(Box::new(command)).map_err(|_| InboxClosed)
    }
}
