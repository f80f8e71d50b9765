pub mod dump;
pub mod error;
pub mod import;
pub mod sqlite;
