//! Ledger abstraction.
//!
//! Protocol state lives in a transactional, string-keyed store supplied by
//! the host. Engines only see [`TxContext`]; [`MemoryLedger`] is the bundled
//! single-process implementation.

mod context;
pub mod keys;
mod memory;

pub use context::{TxContext, TxContextExt};
pub use memory::MemoryLedger;
