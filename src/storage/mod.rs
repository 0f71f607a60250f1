pub mod db;
mod images;
pub mod models;
mod queue;
mod statuses;
mod tables;

pub use db::{Database, DatabaseError};
pub use images::CommitOutcome;
pub use queue::LeasedMessage;
pub use statuses::Transition;
pub use tables::*;
