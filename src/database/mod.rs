// Database module
// Dual store: SQLite for chunk rows and lexical search, LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
