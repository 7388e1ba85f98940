use crate::coordinator::PackageDescriptor;
use crate::job::PreparedJob;

/// A distinct job offered by the coordinator, with local accounting.
#[derive(Debug, Clone)]
pub struct WorkPackage {
    pub work_id: u64,
    pub work_str: String,
    pub block_id: u64,
    pub name: String,
    pub wcet: u32,
    pub bounty_limit: u32,

    /// Bounties announced by us and not yet settled.
    pub pending: u32,

    pub reward_bounty: u64,
    pub reward_pow: u64,
    pub blacklisted: bool,

    /// Present unless the package is blacklisted.
    pub job: Option<PreparedJob>,
}

impl WorkPackage {
    /// Unprepared package built from the coordinator's description.
    pub fn from_descriptor(desc: &PackageDescriptor) -> Self {
        Self {
            work_id: desc.work_id,
            work_str: desc.work_id.to_string(),
            block_id: desc.block_id,
            name: desc.title.clone(),
            wcet: 0,
            bounty_limit: desc.bounty_limit,
            pending: 0,
            reward_bounty: desc.xel_per_bounty,
            reward_pow: desc.xel_per_pow,
            blacklisted: false,
            job: None,
        }
    }

    /// Attach a successfully prepared job.
    pub fn prepared(mut self, job: PreparedJob) -> Self {
        self.wcet = job.wcet;
        self.job = Some(job);
        self
    }

    /// Mark as permanently excluded from selection.
    pub fn blacklist(mut self) -> Self {
        self.blacklisted = true;
        self.job = None;
        self
    }

    /// Not blacklisted and with bounty slots left, counting those the
    /// coordinator already received and those we have in flight.
    pub fn is_eligible(&self, received_bounties: u32) -> bool {
        if self.blacklisted || self.job.is_none() {
            return false;
        }
        received_bounties.saturating_add(self.pending) < self.bounty_limit
    }
}
