//! ticketchain library
//!
//! Three-tier ticket authentication for constrained IoT clients. An
//! authentication server registers identities and issues ticket-granting
//! tickets, a ticket-granting server exchanges those for service tickets,
//! and a service validator checks service tickets and tracks device
//! sessions. Every state change goes through a [`ledger::TxContext`] and
//! depends only on the transaction timestamp, so replicas that replay the
//! same transactions reach byte-identical state.

pub mod audit;
pub mod auth;
pub mod client;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod node;
pub mod protocol;
pub mod ticket;
pub mod validation;
