use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};

/// Interval at which a blocked slot acquisition re-checks for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag, cheap to clone and share between threads.
///
/// A child token observes the cancellation of its parent and of every token
/// above it, but cancelling the child leaves them untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled by `self` or by its own `cancel`
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }
}

/// Fixed-size counting budget of concurrently processed records.
///
/// A token is pushed into a bounded channel of capacity `k` to take a slot and
/// pulled back out to release it, so at most `k` slots are ever held.
pub struct WorkerBudget {
    token_sender: Sender<()>,
    token_receiver: Receiver<()>,
    capacity: usize,
    peak: AtomicUsize,
}

impl WorkerBudget {
    /// Create a budget of `capacity` slots (at least one)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (token_sender, token_receiver) = crossbeam_channel::bounded::<()>(capacity);
        Self {
            token_sender,
            token_receiver,
            capacity,
            peak: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.token_sender.len()
    }

    /// Largest number of slots held at once so far
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Take a slot, blocking while the budget is exhausted.
    ///
    /// Returns `None` if `cancel` fires while waiting.
    pub fn acquire(&self, cancel: &CancelToken) -> Option<BudgetSlot<'_>> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.token_sender.send_timeout((), CANCEL_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(())) => continue,
                Err(SendTimeoutError::Disconnected(())) => return None,
            }
        }
        self.peak.fetch_max(self.in_flight(), Ordering::Relaxed);
        Some(BudgetSlot { budget: self })
    }
}

/// A held budget slot, released on drop
#[must_use = "dropping the slot releases it immediately"]
pub struct BudgetSlot<'a> {
    budget: &'a WorkerBudget,
}

impl Drop for BudgetSlot<'_> {
    fn drop(&mut self) {
        // A slot's token is always in the channel while the slot is alive
        let _ = self.budget.token_receiver.try_recv();
    }
}
