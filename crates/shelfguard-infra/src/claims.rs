use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// In-process guard ensuring at most one component works on a record.
///
/// Sweeper, reclaimer and promoter share one registry. The record store's
/// status compare-and-swap remains the final word on every write.
#[derive(Clone, Default)]
pub struct ClaimRegistry {
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        // A panic while holding the lock cannot leave the set inconsistent.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `id`, or `None` if another operation holds it.
    pub fn try_claim(&self, id: Uuid) -> Option<RecordClaim> {
        if self.lock().insert(id) {
            Some(RecordClaim {
                id,
                registry: self.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_claimed(&self, id: Uuid) -> bool {
        self.lock().contains(&id)
    }
}

/// Released on drop.
pub struct RecordClaim {
    id: Uuid,
    registry: ClaimRegistry,
}

impl RecordClaim {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for RecordClaim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}
