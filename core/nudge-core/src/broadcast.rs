//! Snapshot fan-out to UI observers.
//!
//! Delivery is fire-and-forget. A failing observer is logged and skipped; one
//! that reports [`DeliveryError::Disconnected`] is dropped for good. Nothing
//! is retried and nothing propagates back into the state machine.

use tracing::{debug, warn};

use crate::types::SessionSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("observer disconnected")]
    Disconnected,

    #[error("delivery failed: {0}")]
    Failed(String),
}

pub trait Observer: Send {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn deliver(&mut self, snapshot: &SessionSnapshot) -> Result<(), DeliveryError>;
}

#[derive(Default)]
pub struct Broadcaster {
    observers: Vec<Box<dyn Observer>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn Observer>) {
        debug!(observer = observer.name(), "Observer registered");
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers `snapshot` to every observer. Returns how many accepted it.
    pub fn fan_out(&mut self, snapshot: &SessionSnapshot) -> usize {
        let mut delivered = 0;
        self.observers
            .retain_mut(|observer| match observer.deliver(snapshot) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(DeliveryError::Disconnected) => {
                    debug!(observer = observer.name(), "Observer disconnected; removing");
                    false
                }
                Err(err) => {
                    warn!(
                        observer = observer.name(),
                        error = %err,
                        revision = snapshot.revision,
                        "Snapshot delivery failed"
                    );
                    true
                }
            });
        delivered
    }
}
