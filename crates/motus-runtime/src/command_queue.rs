//! [`command_queue`][self] – the FIFO between producers and the scheduler.
//!
//! [`command_queue()`] returns a cloneable [`CommandSender`] for producers
//! (the text controller, the Ctrl-C handler, tests) and a single
//! [`CommandReceiver`] owned by the actuation scheduler.  Both ends share one
//! mutex-protected deque.  Enqueueing never blocks on the consumer and never
//! rejects; dequeueing never waits.
//!
//! [`CommandSender::enqueue_batch`] pushes a whole expanded plan under one
//! lock acquisition, so a plan stays contiguous even when another producer
//! is enqueueing at the same time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use motus_types::Command;

type Shared = Arc<Mutex<VecDeque<Command>>>;

fn lock(queue: &Shared) -> MutexGuard<'_, VecDeque<Command>> {
    // A producer that panicked mid-push leaves the deque itself intact.
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a connected sender/receiver pair over an empty queue.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let shared: Shared = Arc::new(Mutex::new(VecDeque::new()));
    (
        CommandSender {
            queue: Arc::clone(&shared),
        },
        CommandReceiver { queue: shared },
    )
}

/// Producer handle.  Clone freely.
#[derive(Clone)]
pub struct CommandSender {
    queue: Shared,
}

impl CommandSender {
    /// Append one command at the back.
    pub fn enqueue(&self, command: Command) {
        lock(&self.queue).push_back(command);
    }

    /// Append every command in order, with no other producer's commands
    /// interleaved.  Returns how many were queued.
    pub fn enqueue_batch(&self, commands: impl IntoIterator<Item = Command>) -> usize {
        let mut q = lock(&self.queue);
        let before = q.len();
        q.extend(commands);
        q.len() - before
    }

    /// Number of commands waiting.
    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer handle.  Deliberately not `Clone`: the scheduler is the only
/// reader.
pub struct CommandReceiver {
    queue: Shared,
}

impl CommandReceiver {
    /// Remove and return the front command, or `None` if the queue is empty.
    pub fn try_dequeue_front(&mut self) -> Option<Command> {
        lock(&self.queue).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
