pub mod config;
pub mod error;
pub mod persister;
pub mod schema;
pub mod store;

pub use config::{DATA_DIR_ENV, DataDir, PolicyFile};
pub use error::{Result, StoreError};
pub use persister::{Notification, PersistHandle, Persister};
pub use store::Store;
