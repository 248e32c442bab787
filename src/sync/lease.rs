use dashmap::DashSet;
use std::sync::Arc;

/// Best-effort in-process lease guaranteeing at most one active sync worker
/// per connection. Dropping the guard releases the lease.
#[derive(Clone, Default)]
pub struct SyncLease {
    active: Arc<DashSet<String>>,
}

impl SyncLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take the lease for a connection. Returns `None` while
    /// another worker holds it.
    pub fn acquire(&self, connection_id: &str) -> Option<LeaseGuard> {
        if self.active.insert(connection_id.to_string()) {
            Some(LeaseGuard {
                active: self.active.clone(),
                connection_id: connection_id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, connection_id: &str) -> bool {
        self.active.contains(connection_id)
    }
}

pub struct LeaseGuard {
    active: Arc<DashSet<String>>,
    connection_id: String,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.active.remove(&self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let lease = SyncLease::new();

        let guard = lease.acquire("conn-1");
        assert!(guard.is_some());
        assert!(lease.acquire("conn-1").is_none());
        assert!(lease.is_held("conn-1"));

        drop(guard);
        assert!(!lease.is_held("conn-1"));
        assert!(lease.acquire("conn-1").is_some());
    }

    #[test]
    fn leases_are_independent_per_connection() {
        let lease = SyncLease::new();
        let _a = lease.acquire("conn-a").unwrap();
        assert!(lease.acquire("conn-b").is_some());
    }
}
