use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

/// The process-wide mutual-exclusion set from §4.5: guards against
/// concurrent close attempts on the same position (SL/TP monitor vs.
/// client close vs. match-end settlement). Entry is idempotent — a
/// second caller finding the id already present aborts cleanly rather
/// than erroring loudly, per spec.
#[derive(Clone, Default)]
pub struct ClosingRegistry {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ClosingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim `position_id`. Returns `None` if another closer
    /// already holds it; otherwise returns a guard that releases the
    /// claim when dropped, on every exit path including an early `?`
    /// return.
    pub async fn try_claim(&self, position_id: &str) -> Option<ClosingGuard> {
        let mut set = self.inner.lock().await;
        if !set.insert(position_id.to_string()) {
            return None;
        }
        Some(ClosingGuard {
            registry: self.inner.clone(),
            position_id: position_id.to_string(),
        })
    }
}

/// Releases its position id from the registry on drop. The match-end
/// settlement sweep holds one of these per position in its batch, so the
/// whole batch's claims clear even if settlement aborts partway through.
pub struct ClosingGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    position_id: String,
}

impl Drop for ClosingGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let position_id = std::mem::take(&mut self.position_id);
        tokio::spawn(async move {
            registry.lock().await.remove(&position_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_claim_is_rejected_while_guard_lives() {
        let registry = ClosingRegistry::new();
        let guard = registry.try_claim("pos1").await;
        assert!(guard.is_some());
        assert!(registry.try_claim("pos1").await.is_none());
    }

    #[tokio::test]
    async fn claim_is_released_on_drop() {
        let registry = ClosingRegistry::new();
        {
            let _guard = registry.try_claim("pos1").await.unwrap();
        }
        // Drop spawns the release; yield so it runs.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(registry.try_claim("pos1").await.is_some());
    }
}
