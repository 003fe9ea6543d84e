//! Seshat: atomic multi-key, multi-datastore transactions over key-value
//! stores that only offer single-key compare-and-swap.
//!
//! Every key is stored as a [`VersionedItem`] carrying its own short version
//! history. Writers prepare their keys with CAS, take a commit timestamp from
//! a [`TimeSource`], and decide the outcome with a single transaction status
//! record. Readers see a snapshot and resolve writes abandoned mid-flight.
//! Start from [`Seshat`] or build a [`Transaction`] by hand.

pub mod clock;
pub mod config;
pub mod connector;
pub mod data_store;
pub mod discovery;
pub mod errors;
pub mod item;
#[cfg(feature = "network")]
pub mod network;
pub mod oracle;
pub mod serializer;
pub mod seshat;
pub mod timesource;
pub mod transaction;

// Re-export key types and structs for easier access
pub use connector::{Connector, MemoryConnector};
pub use data_store::{Datastore, Executor, LocalExecutor};
pub use errors::{Result, SeshatError};
pub use item::{ItemSnapshot, TxnState, Version, VersionedItem};
pub use seshat::{Seshat, SeshatBuilder, prelude};
pub use timesource::{TimeMode, TimeSource};
pub use transaction::{Transaction, TxnStatus};
