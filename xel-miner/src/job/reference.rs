//! Built-in job backend used when no external compiler is linked.
//!
//! Every package is treated as a pure proof-of-work job: the instance folds
//! the loaded inputs and a digest of the job source into the four state
//! words, and never signals a bounty. The execution cost estimate is the
//! decoded source length.

use std::sync::Arc;

use md5::{Digest, Md5};

use super::{
    Execution, InstanceError, JobBackend, JobCompiler, JobInstance, PrepareError, PreparedJob,
    VmMemory, VM_INPUTS,
};

/// Prepares packages for the reference backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceCompiler;

impl JobCompiler for ReferenceCompiler {
    fn prepare(&self, _work_str: &str, source: &[u8]) -> Result<PreparedJob, PrepareError> {
        let wcet = u32::try_from(source.len()).map_err(|_| PrepareError::Wcet)?;
        if wcet == 0 {
            return Err(PrepareError::Wcet);
        }

        let digest = Md5::digest(source);
        let mut seed = [0u32; 4];
        for (word, chunk) in seed.iter_mut().zip(digest.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Ok(PreparedJob::new(wcet, Arc::new(ReferenceBackend { seed })))
    }
}

struct ReferenceBackend {
    seed: [u32; 4],
}

impl JobBackend for ReferenceBackend {
    fn instantiate(&self) -> Result<Box<dyn JobInstance>, InstanceError> {
        Ok(Box::new(ReferenceInstance {
            seed: self.seed,
            bound: false,
        }))
    }

    fn kind(&self) -> &'static str {
        "reference"
    }
}

struct ReferenceInstance {
    seed: [u32; 4],
    bound: bool,
}

impl ReferenceInstance {
    fn mix(&self, mem: &mut VmMemory) {
        let mut state = self.seed;
        for (i, input) in mem.ints.iter().take(VM_INPUTS).enumerate() {
            let lane = i % 4;
            state[lane] = state[lane]
                .rotate_left(7)
                .wrapping_add(*input as u32)
                ^ state[(lane + 1) % 4];
        }
        mem.state = state;
    }
}

impl JobInstance for ReferenceInstance {
    fn initialize(&mut self, mem: &mut VmMemory) -> Result<(), InstanceError> {
        if mem.ints.len() < VM_INPUTS {
            return Err(InstanceError::Initialize(format!(
                "need {VM_INPUTS} integer words, have {}",
                mem.ints.len()
            )));
        }
        self.bound = true;
        Ok(())
    }

    fn execute(&mut self, mem: &mut VmMemory) -> Execution {
        if self.bound {
            self.mix(mem);
        }
        Execution::Nothing
    }

    fn verify(&mut self, mem: &mut VmMemory) -> bool {
        self.execute(mem) == Execution::Bounty
    }
}
