//! Per-chain exclusive leases
//!
//! Each chain key maps to its own async mutex, so appends to one chain are
//! serialized while unrelated chains proceed in parallel. Entries are removed
//! when the last holder or waiter lets go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::OwnedMutexGuard;

use crate::error::{ServerError, ServerResult};

type LeaseTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Registry of chain leases
#[derive(Default, Clone)]
pub struct ChainLeases {
    table: Arc<LeaseTable>,
}

/// Exclusive right to append to one chain; released on drop
pub struct ChainLease {
    guard: Option<OwnedMutexGuard<()>>,
    chain_key: String,
    table: Arc<LeaseTable>,
}

impl ChainLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for the lease on `chain_key`
    pub async fn acquire(&self, chain_key: &str, timeout: Duration) -> ServerResult<ChainLease> {
        let lock = {
            let mut table = self
                .table
                .lock()
                .map_err(|_| ServerError::Internal("lease table poisoned".into()))?;
            Arc::clone(table.entry(chain_key.to_string()).or_default())
        };

        let started = Instant::now();
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(ChainLease {
                guard: Some(guard),
                chain_key: chain_key.to_string(),
                table: Arc::clone(&self.table),
            }),
            Err(_) => {
                reclaim(&self.table, chain_key);
                Err(ServerError::LeaseTimeout {
                    chain_key: chain_key.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// Chains with a current holder or waiter
    pub fn active_chains(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl ChainLease {
    pub fn chain_key(&self) -> &str {
        &self.chain_key
    }
}

impl Drop for ChainLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        reclaim(&self.table, &self.chain_key);
    }
}

/// Remove an entry nobody else references
fn reclaim(table: &LeaseTable, chain_key: &str) {
    if let Ok(mut table) = table.lock() {
        if table
            .get(chain_key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(chain_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_chain_is_exclusive() {
        let leases = ChainLeases::new();
        let held = leases
            .acquire("u1", Duration::from_millis(100))
            .await
            .unwrap();

        let err = leases
            .acquire("u1", Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::LeaseTimeout { .. }));
        assert!(err.is_recoverable());

        drop(held);
        assert!(leases.acquire("u1", Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_chains_do_not_block() {
        let leases = ChainLeases::new();
        let _a = leases.acquire("u1", Duration::from_millis(50)).await.unwrap();
        let b = leases.acquire("u2", Duration::from_millis(50)).await.unwrap();
        assert_eq!(b.chain_key(), "u2");
        assert_eq!(leases.active_chains(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_reclaimed() {
        let leases = ChainLeases::new();
        {
            let _lease = leases.acquire("u1", Duration::from_millis(50)).await.unwrap();
            assert_eq!(leases.active_chains(), 1);
        }
        assert_eq!(leases.active_chains(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_waiter_gets_lease_after_release() {
        let leases = ChainLeases::new();
        let held = leases.acquire("u1", Duration::from_millis(50)).await.unwrap();

        let waiter = {
            let leases = leases.clone();
            tokio::spawn(async move { leases.acquire("u1", Duration::from_secs(2)).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap());
    }
}
