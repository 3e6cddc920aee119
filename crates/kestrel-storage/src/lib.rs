//! Storage Façade: the only way any component is allowed to persist
//! state, and the only writer of the state cache.

pub mod backend;
pub mod backend_postgres;
pub mod backend_sled;
pub mod facade;

pub use backend::{StorageBackend, StorageError};
pub use backend_postgres::PostgresBackend;
pub use backend_sled::SledBackend;
pub use facade::Facade;
