//! Config entries
//!
//! One entry per configured account of an integration, with its lifecycle
//! and the JSON file persisting it.

pub mod entry;
pub mod manager;
pub mod state_machine;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryUpdate, EntryMap};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};
pub use state_machine::{calculate_retry_delay, ConfigEntryState, InvalidTransition};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
