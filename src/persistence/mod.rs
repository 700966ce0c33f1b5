//! Persistence - SQLite storage of settings and the panel state

mod database;
mod persister;
mod snapshot;

pub use database::Database;
pub use persister::{PersistEvent, Persister};
