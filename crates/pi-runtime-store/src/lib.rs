//! Atomic JSON read/modify/write with OS advisory locking for cross-process
//! shared state.
//!
//! [`StateStore::with_lock`] is the only way any component mutates shared JSON
//! on disk: it takes an exclusive lock on a sibling `.lock` file, reads the
//! current value (or a default, self-healing past corruption), hands it to a
//! closure, and writes the result back via a temp-file-then-rename so readers
//! never observe a torn write. [`StateStore::read_snapshot`] does the same
//! under a shared lock for read-only access.
//!
//! ## Example
//!
//! ```rust
//! use pi_runtime_store::{StateStore, StoreConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Counters { calls: u64 }
//!
//! # async fn example() -> Result<(), pi_runtime_core::RuntimeError> {
//! let store = StateStore::new(StoreConfig::builder().build());
//! let updated: Counters = store
//!     .with_lock("/tmp/pi-runtime-example.json", |c: Counters| Counters { calls: c.calls + 1 })
//!     .await?;
//! assert!(updated.calls >= 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod lockfile;
mod store;

pub use config::{StoreConfig, StoreConfigBuilder};
pub use store::StateStore;
