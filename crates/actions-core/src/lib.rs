pub mod action;
pub mod config;
pub mod error;
pub mod keys;
pub mod query;
pub mod repository;

pub use action::{Action, ActionStatus};
pub use error::{ActionsError, Result};
pub use query::{ActionFilter, DatetimeRange};
pub use repository::{
    ActionRepository, BatchWriteReport, Listing, MemoryActionRepository, RedbActionRepository,
};
