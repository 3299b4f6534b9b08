use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("a transfer with {active} is already in progress")]
    Busy { active: String },
}

/// Admits at most one transfer session per process. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    active: Arc<Mutex<Option<String>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `peer`, or reports who holds it.
    pub fn try_acquire(&self, peer: &str) -> Result<SlotGuard, SlotError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = active.as_ref() {
            return Err(SlotError::Busy {
                active: current.clone(),
            });
        }
        *active = Some(peer.to_string());
        debug!("Transfer slot taken by {}", peer);
        Ok(SlotGuard {
            slot: self.active.clone(),
        })
    }

    pub fn holder(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.holder().is_some()
    }
}

/// Releases the slot when dropped.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<Mutex<Option<String>>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(peer) = active.take() {
            debug!("Transfer slot released by {}", peer);
        }
    }
}
