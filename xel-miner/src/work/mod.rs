//! Work packages and the choice of what to mine.
//!
//! [`WorkCatalog`] remembers every package the coordinator has offered,
//! [`selector`] ranks the eligible ones, and [`CurrentWork`] publishes the
//! winner to the worker pool.

mod catalog;
pub mod current;
pub(crate) mod package;
pub mod selector;

pub use catalog::WorkCatalog;
pub use current::{ActiveJob, CurrentWork, PublishOutcome};
pub use package::WorkPackage;
pub use selector::{Candidate, Preference, PreferenceError, WorkSelector};
