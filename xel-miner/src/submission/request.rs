use std::fmt;
use std::time::{Duration, Instant};

use crate::coordinator::Request;
use crate::miner::{SolutionKind, SolutionReport};

/// Age after which a request is force-completed as timed out.
pub const STALE_AFTER: Duration = Duration::from_secs(15 * 60);

/// Where a request is in its protocol.
///
/// Bounties go `Announce -> Confirm -> Claim -> Complete`; proofs of work go
/// `Submit -> Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Announce,
    Confirm,
    Claim,
    Submit,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Announce => "announce",
            Phase::Confirm => "confirm",
            Phase::Claim => "claim",
            Phase::Submit => "submit",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// One solution travelling through the submission protocol.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub id: u64,
    pub worker: usize,
    pub work_id: u64,
    pub block_id: u64,
    pub kind: SolutionKind,
    pub phase: Phase,
    pub created: Instant,
    pub last_attempt: Option<Instant>,

    /// Attempts spent in the current phase.
    pub retries: u32,

    /// Earliest time of the next attempt.
    pub not_before: Instant,

    /// Uppercase hex; empty for proofs of work.
    pub announcement_hex: String,
    pub multiplicator_hex: String,
}

impl SubmissionRequest {
    pub fn from_report(id: u64, report: &SolutionReport, now: Instant) -> Self {
        let phase = match report.kind {
            SolutionKind::Bounty => Phase::Announce,
            SolutionKind::Pow => Phase::Submit,
        };

        Self {
            id,
            worker: report.worker,
            work_id: report.work_id,
            block_id: report.block_id,
            kind: report.kind,
            phase,
            created: now,
            last_attempt: None,
            retries: 0,
            not_before: now,
            announcement_hex: report
                .announcement
                .map(hex::encode_upper)
                .unwrap_or_default(),
            multiplicator_hex: report.multiplicator.to_hex(),
        }
    }

    pub fn is_bounty(&self) -> bool {
        self.kind == SolutionKind::Bounty
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.is_complete() && now >= self.not_before
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= STALE_AFTER
    }

    /// Coordinator request for the current phase.
    pub fn to_request(&self) -> Option<Request> {
        let work_id = self.work_id;
        match self.phase {
            Phase::Announce => Some(Request::BountyAnnouncement {
                work_id,
                hash_announcement: self.announcement_hex.clone(),
            }),
            Phase::Confirm => Some(Request::GetApprovedBounties {
                work_id,
                hash_announcement: self.announcement_hex.clone(),
            }),
            Phase::Claim => Some(Request::CreatePox {
                work_id,
                multiplicator: self.multiplicator_hex.clone(),
                is_pow: false,
            }),
            Phase::Submit => Some(Request::CreatePox {
                work_id,
                multiplicator: self.multiplicator_hex.clone(),
                is_pow: true,
            }),
            Phase::Complete => None,
        }
    }
}
