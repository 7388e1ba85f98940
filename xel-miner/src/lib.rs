//! xel-miner: a mining client for Elastic (XEL) work packages.
//!
//! Workers evaluate the selected job in parallel; a single coordinator loop
//! fetches work, publishes the active job, and drives solutions through the
//! coordinator's submission protocol.

pub mod config;
pub mod console;
pub mod coordinator;
pub mod daemon;
pub mod job;
pub mod longpoll;
pub mod miner;
pub mod scheduler;
pub mod solution_queue;
pub mod submission;
pub mod tracing;
pub mod types;
pub mod work;
