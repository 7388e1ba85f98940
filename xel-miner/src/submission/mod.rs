//! Submission of solutions through the coordinator's acknowledgment
//! protocol.
//!
//! A bounty is announced by hash, polled until the announcement is approved,
//! then claimed with its multiplicator. A proof of work is submitted once.
//! Each solution becomes one [`SubmissionRequest`] tracked in the
//! [`SubmissionBook`] until it completes or goes stale.

mod book;
pub mod machine;
mod request;

pub use book::{SubmissionBook, SubmissionStats, Tally};
pub use machine::{Disposition, Transition};
pub use request::{Phase, SubmissionRequest, STALE_AFTER};
