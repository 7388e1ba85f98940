//! Phase transitions driven by coordinator responses.
//!
//! Transitions are pure: they mutate a request copied out of the book and
//! report what happened. The book applies the result.

use std::fmt;
use std::time::{Duration, Instant};

use super::request::{Phase, SubmissionRequest};
use crate::coordinator::{Approval, SubmitResponse};

/// Unapproved confirmation polls tolerated before giving up.
pub const CONFIRM_RETRIES: u32 = 20;

/// Delay between confirmation polls.
pub const CONFIRM_INTERVAL: Duration = Duration::from_secs(30);

/// How a completed request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Accepted,

    /// Genuine refusal by the coordinator.
    Rejected,

    /// Harmless duplicate of something already submitted.
    Discarded,

    Deprecated,
    TimedOut,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Disposition::Accepted => "accepted",
            Disposition::Rejected => "rejected",
            Disposition::Discarded => "discarded",
            Disposition::Deprecated => "deprecated",
            Disposition::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// Result of applying one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved to a new phase, due immediately.
    Advanced(Phase),

    /// Same phase, next attempt scheduled.
    Retry,

    /// Reached [`Phase::Complete`].
    Completed(Disposition),
}

fn enter(req: &mut SubmissionRequest, phase: Phase, now: Instant) -> Transition {
    req.phase = phase;
    req.retries = 0;
    req.not_before = now;
    Transition::Advanced(phase)
}

fn complete(req: &mut SubmissionRequest, disposition: Disposition) -> Transition {
    req.phase = Phase::Complete;
    Transition::Completed(disposition)
}

/// Final step of a one-shot phase: duplicate, refusal, or success.
fn settle_final(req: &mut SubmissionRequest, response: &SubmitResponse) -> Transition {
    let disposition = if response.is_duplicate() {
        Disposition::Discarded
    } else if response.error_description.is_some() {
        Disposition::Rejected
    } else {
        Disposition::Accepted
    };
    complete(req, disposition)
}

/// Apply a coordinator response to `req`.
pub fn advance(req: &mut SubmissionRequest, response: &SubmitResponse, now: Instant) -> Transition {
    req.last_attempt = Some(now);

    match req.phase {
        Phase::Announce => {
            if response.is_duplicate() {
                complete(req, Disposition::Discarded)
            } else if response.error_description.is_some() {
                complete(req, Disposition::Rejected)
            } else {
                enter(req, Phase::Confirm, now)
            }
        }
        Phase::Confirm => match response.approval() {
            Approval::Approved => enter(req, Phase::Claim, now),
            Approval::Deprecated => complete(req, Disposition::Deprecated),
            Approval::Pending => {
                req.retries += 1;
                if req.retries > CONFIRM_RETRIES {
                    complete(req, Disposition::TimedOut)
                } else {
                    req.not_before = now + CONFIRM_INTERVAL;
                    Transition::Retry
                }
            }
        },
        Phase::Claim | Phase::Submit => settle_final(req, response),
        Phase::Complete => Transition::Retry,
    }
}

/// Force-complete a request that outlived the staleness bound.
pub fn expire(req: &mut SubmissionRequest) -> Transition {
    complete(req, Disposition::TimedOut)
}

/// Postpone the next attempt after a transport failure.
///
/// Does not consume the phase's retry budget; the staleness bound still
/// applies.
pub fn postpone(req: &mut SubmissionRequest, now: Instant, pause: Duration) {
    req.last_attempt = Some(now);
    req.not_before = now + pause;
}
