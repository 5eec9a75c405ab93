//! Local persistence
//!
//! A string key-value store plus a typed façade for the credential record,
//! the generation history and the model catalog.

pub mod file;
pub mod memory;
pub mod storage;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use storage::{default_models, Storage};

use crate::Result;

/// Computes the next value of a key from its current one. `None` removes it.
pub type Update<'a> = Box<dyn FnOnce(Option<String>) -> Result<Option<String>> + 'a>;

/// Values are JSON documents stored as text.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Read and rewrite one key without another writer getting in between.
    /// Nothing changes when `apply` fails.
    fn update(&self, key: &str, apply: Update<'_>) -> Result<()>;
    /// All keys currently present, in sorted order.
    fn list(&self) -> Result<Vec<String>>;
}
