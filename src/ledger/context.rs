//! The transaction context every protocol operation runs against.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TicketChainResult;

/// A single replicated transaction over string-keyed state.
///
/// Implementations provide read-your-writes semantics within the transaction
/// and a clock that is identical on every replica executing it.
pub trait TxContext {
    /// Transaction timestamp in Unix seconds.
    fn tx_timestamp(&self) -> u64;

    /// Read a value, seeing writes staged earlier in this transaction.
    fn get_state(&self, key: &str) -> TicketChainResult<Option<Vec<u8>>>;

    /// Stage a write.
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> TicketChainResult<()>;

    /// Stage a delete.
    fn del_state(&mut self, key: &str) -> TicketChainResult<()>;

    /// All entries with `start <= key < end`, in key order.
    fn get_state_by_range(&self, start: &str, end: &str)
        -> TicketChainResult<Vec<(String, Vec<u8>)>>;
}

/// JSON convenience accessors over any [`TxContext`].
pub trait TxContextExt: TxContext {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> TicketChainResult<Option<T>> {
        match self.get_state(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> TicketChainResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_state(key, bytes)
    }

    fn range_json<T: DeserializeOwned>(
        &self,
        start: &str,
        end: &str,
    ) -> TicketChainResult<Vec<(String, T)>> {
        self.get_state_by_range(start, end)?
            .into_iter()
            .map(|(key, bytes)| Ok((key, serde_json::from_slice(&bytes)?)))
            .collect()
    }
}

impl<C: TxContext + ?Sized> TxContextExt for C {}
