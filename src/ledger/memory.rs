//! In-memory ledger with serialized, staged transactions.
//!
//! Stands in for the replicated store in tests and single-node deployments.
//! Transactions run one at a time behind a single lock; reads see staged
//! writes, and staged writes are published together when the body returns.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use tracing::trace;

use super::context::TxContext;
use crate::error::TicketChainResult;

/// Ordered in-memory key-value ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` as one transaction at `timestamp`.
    ///
    /// Staged writes are published whether the body returns `Ok` or `Err`,
    /// so cleanup performed on a failure path (expired challenges, spent
    /// markers) persists. Engines stage nothing else before failing. A body
    /// that panics publishes nothing.
    pub fn transact<T, F>(&self, timestamp: u64, body: F) -> TicketChainResult<T>
    where
        F: FnOnce(&mut dyn TxContext) -> TicketChainResult<T>,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut tx = MemoryTx {
            committed: &*state,
            pending: BTreeMap::new(),
            timestamp,
        };
        let result = body(&mut tx);
        let pending = tx.pending;

        trace!(timestamp, writes = pending.len(), ok = result.is_ok(), "Publishing transaction");
        for (key, value) in pending {
            match value {
                Some(bytes) => {
                    state.insert(key, bytes);
                }
                None => {
                    state.remove(&key);
                }
            }
        }

        result
    }

    /// Read committed state outside a transaction.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Whether a key exists in committed state.
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Copy of the committed state, for comparing replicas.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct MemoryTx<'a> {
    committed: &'a BTreeMap<String, Vec<u8>>,
    /// `None` marks a staged delete.
    pending: BTreeMap<String, Option<Vec<u8>>>,
    timestamp: u64,
}

impl TxContext for MemoryTx<'_> {
    fn tx_timestamp(&self) -> u64 {
        self.timestamp
    }

    fn get_state(&self, key: &str) -> TicketChainResult<Option<Vec<u8>>> {
        if let Some(staged) = self.pending.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.committed.get(key).cloned())
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> TicketChainResult<()> {
        self.pending.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> TicketChainResult<()> {
        self.pending.insert(key.to_string(), None);
        Ok(())
    }

    fn get_state_by_range(
        &self,
        start: &str,
        end: &str,
    ) -> TicketChainResult<Vec<(String, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let bounds = (
            Bound::Included(start.to_string()),
            Bound::Excluded(end.to_string()),
        );

        let mut merged: BTreeMap<String, Vec<u8>> = self
            .committed
            .range(bounds.clone())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, staged) in self.pending.range(bounds) {
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProtocolErrorKind, TicketChainError};

    #[test]
    fn test_read_your_writes() {
        let ledger = MemoryLedger::new();
        ledger
            .transact(1, |ctx| {
                ctx.put_state("A", b"1".to_vec())?;
                assert_eq!(ctx.get_state("A")?, Some(b"1".to_vec()));
                ctx.del_state("A")?;
                assert_eq!(ctx.get_state("A")?, None);
                ctx.put_state("B", b"2".to_vec())
            })
            .unwrap();

        assert!(!ledger.contains("A"));
        assert_eq!(ledger.get("B"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_timestamp_is_exposed() {
        let ledger = MemoryLedger::new();
        let ts = ledger.transact(1_700_000_000, |ctx| Ok(ctx.tx_timestamp())).unwrap();
        assert_eq!(ts, 1_700_000_000);
    }

    #[test]
    fn test_error_still_publishes_staged_cleanup() {
        let ledger = MemoryLedger::new();
        ledger
            .transact(1, |ctx| ctx.put_state("CHALLENGE_x", b"old".to_vec()))
            .unwrap();

        let result: TicketChainResult<()> = ledger.transact(2, |ctx| {
            ctx.del_state("CHALLENGE_x")?;
            Err(TicketChainError::protocol(ProtocolErrorKind::Expired {
                what: "challenge".to_string(),
            }))
        });

        assert!(result.is_err());
        assert!(!ledger.contains("CHALLENGE_x"));
    }

    #[test]
    fn test_panic_publishes_nothing() {
        let ledger = MemoryLedger::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: TicketChainResult<()> = ledger.transact(1, |ctx| {
                ctx.put_state("A", b"1".to_vec())?;
                panic!("body failed");
            });
        }));
        assert!(outcome.is_err());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_range_merges_pending() {
        let ledger = MemoryLedger::new();
        ledger
            .transact(1, |ctx| {
                ctx.put_state("K_a", b"a".to_vec())?;
                ctx.put_state("K_b", b"b".to_vec())?;
                ctx.put_state("L_a", b"x".to_vec())
            })
            .unwrap();

        ledger
            .transact(2, |ctx| {
                ctx.del_state("K_a")?;
                ctx.put_state("K_c", b"c".to_vec())?;
                let keys: Vec<String> = ctx
                    .get_state_by_range("K_", "K_~")?
                    .into_iter()
                    .map(|(k, _)| k)
                    .collect();
                assert_eq!(keys, vec!["K_b".to_string(), "K_c".to_string()]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let ledger = MemoryLedger::new();
        let rows = ledger
            .transact(1, |ctx| ctx.get_state_by_range("Z", "A"))
            .unwrap();
        assert!(rows.is_empty());
    }
}
