//! Job logic capability interface.
//!
//! A work package carries the source of a job. Turning that source into
//! something executable is the business of a [`JobCompiler`]; the rest of the
//! miner only sees the [`JobInstance`] contract (initialize / execute /
//! verify) that each worker drives against its own [`VmMemory`].
//!
//! Compilers hand back a [`PreparedJob`], which carries the job's estimated
//! worst-case execution cost and a shareable [`JobBackend`] able to stamp out
//! one instance per worker.

pub mod ascii85;
mod reference;

use std::fmt;
use std::sync::Arc;

pub use reference::ReferenceCompiler;

/// Number of words of VM memory seeded from the mixed inputs.
pub const VM_INPUTS: usize = 12;

/// Integer memory words available to a job instance.
pub const VM_INT_WORDS: usize = 64_000;

/// Floating-point memory words available to a job instance.
pub const VM_FLOAT_WORDS: usize = 1_000;

/// Largest accepted job source, in bytes, both encoded and decoded.
pub const MAX_SOURCE_SIZE: usize = 512 * 1024;

/// Errors raised while turning a package's source into a runnable job.
///
/// Any of these blacklists the package.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("source is empty")]
    EmptySource,

    #[error("source exceeds {max} bytes: {0} bytes", max = MAX_SOURCE_SIZE)]
    SourceTooLarge(usize),

    #[error("unable to decode source: {0}")]
    Decode(#[from] ascii85::DecodeError),

    #[error("unable to build job: {0}")]
    Build(String),

    #[error("unable to estimate execution cost")]
    Wcet,
}

/// Errors raised by a job instance or its memory.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("unable to allocate VM memory: {0}")]
    Allocation(#[from] std::collections::TryReserveError),

    #[error("instance initialization failed: {0}")]
    Initialize(String),
}

/// What a single evaluation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Nothing signaled by the job itself.
    Nothing,

    /// The job logic signaled an internal match.
    Bounty,

    /// The backend already checked the digest against the target.
    Pow,
}

/// Per-worker memory an instance operates on.
pub struct VmMemory {
    pub ints: Vec<i32>,
    pub floats: Vec<f64>,
    pub state: [u32; 4],
}

impl VmMemory {
    /// Allocate zeroed memory, failing instead of aborting when the
    /// allocator cannot satisfy the request.
    pub fn allocate() -> Result<Self, InstanceError> {
        let mut ints = Vec::new();
        ints.try_reserve_exact(VM_INT_WORDS)?;
        ints.resize(VM_INT_WORDS, 0);

        let mut floats = Vec::new();
        floats.try_reserve_exact(VM_FLOAT_WORDS)?;
        floats.resize(VM_FLOAT_WORDS, 0.0);

        Ok(Self {
            ints,
            floats,
            state: [0; 4],
        })
    }

    /// Seed memory with a fresh input vector and reset the state words.
    pub fn load_inputs(&mut self, inputs: &[u32; VM_INPUTS]) {
        for (slot, input) in self.ints.iter_mut().zip(inputs) {
            *slot = *input as i32;
        }
        self.state = [0; 4];
    }

    /// The input words currently loaded.
    pub fn inputs(&self) -> [u32; VM_INPUTS] {
        let mut inputs = [0u32; VM_INPUTS];
        for (input, slot) in inputs.iter_mut().zip(&self.ints) {
            *input = *slot as u32;
        }
        inputs
    }
}

/// Executable logic of one job, owned by one worker.
pub trait JobInstance: Send {
    /// Bind the instance to the worker's memory.
    fn initialize(&mut self, mem: &mut VmMemory) -> Result<(), InstanceError>;

    /// Run one evaluation against the inputs loaded in `mem`.
    fn execute(&mut self, mem: &mut VmMemory) -> Execution;

    /// Re-run the evaluation and confirm the bounty signal.
    fn verify(&mut self, mem: &mut VmMemory) -> bool;
}

/// Factory of per-worker instances for one prepared job.
pub trait JobBackend: Send + Sync {
    fn instantiate(&self) -> Result<Box<dyn JobInstance>, InstanceError>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

/// A job that passed preparation.
#[derive(Clone)]
pub struct PreparedJob {
    pub wcet: u32,
    backend: Arc<dyn JobBackend>,
}

impl PreparedJob {
    pub fn new(wcet: u32, backend: Arc<dyn JobBackend>) -> Self {
        Self { wcet, backend }
    }

    pub fn instantiate(&self) -> Result<Box<dyn JobInstance>, InstanceError> {
        self.backend.instantiate()
    }
}

impl fmt::Debug for PreparedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedJob")
            .field("wcet", &self.wcet)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

/// Turns decoded job source into a [`PreparedJob`].
pub trait JobCompiler: Send + Sync {
    fn prepare(&self, work_str: &str, source: &[u8]) -> Result<PreparedJob, PrepareError>;
}

/// Validate and decode a package's encoded source.
pub fn decode_source(encoded: &str) -> Result<Vec<u8>, PrepareError> {
    if encoded.is_empty() {
        return Err(PrepareError::EmptySource);
    }
    if encoded.len() > MAX_SOURCE_SIZE {
        return Err(PrepareError::SourceTooLarge(encoded.len()));
    }

    let decoded = ascii85::decode(encoded)?;
    if decoded.is_empty() {
        return Err(PrepareError::EmptySource);
    }
    if decoded.len() > MAX_SOURCE_SIZE {
        return Err(PrepareError::SourceTooLarge(decoded.len()));
    }
    Ok(decoded)
}
