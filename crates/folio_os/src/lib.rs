#![forbid(unsafe_code)]

pub mod content_fetch;
pub mod explorer;
pub mod in_memory;
pub mod navigator;
pub mod session;

pub use explorer::{ExplorerError, ExplorerSession, LibraryCreateOutcome, SelectOutcome};
