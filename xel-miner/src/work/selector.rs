//! Choosing which work package to mine.

use std::fmt;
use std::str::FromStr;

use super::WorkPackage;
use crate::tracing::prelude::*;
use crate::types::Target;

/// How to rank eligible packages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Preference {
    /// Highest proof-of-work reward per unit of expected effort.
    #[default]
    Profit,

    /// Lowest worst-case execution cost.
    Wcet,

    /// One specific package, by id.
    WorkId(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceError {
    #[error("work id required with 'workid' preference (workid:<id>)")]
    MissingWorkId,

    #[error("unknown mining preference '{0}' (profit, wcet, workid:<id>)")]
    Unknown(String),
}

impl FromStr for Preference {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => (kind, Some(id)),
            None => (s, None),
        };

        match kind.to_ascii_lowercase().as_str() {
            "profit" => Ok(Preference::Profit),
            "wcet" => Ok(Preference::Wcet),
            "workid" => match id.map(str::trim) {
                Some(id) if !id.is_empty() => Ok(Preference::WorkId(id.to_string())),
                _ => Err(PreferenceError::MissingWorkId),
            },
            _ => Err(PreferenceError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preference::Profit => write!(f, "profit"),
            Preference::Wcet => write!(f, "wcet"),
            Preference::WorkId(id) => write!(f, "workid:{}", id),
        }
    }
}

/// A package paired with the coordinator's current offer for it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub package: WorkPackage,
    pub target: Target,
    pub received_bounties: u32,
}

impl Candidate {
    /// Proof-of-work reward per unit of effort at the offered target.
    pub fn profit(&self) -> f64 {
        self.package.reward_pow as f64 / (self.package.wcet as f64 * self.target.difficulty())
    }

    fn is_eligible(&self) -> bool {
        self.package.is_eligible(self.received_bounties)
    }
}

/// Pick the best eligible candidate under `preference`.
///
/// Ties keep the candidate seen first. Under `profit` a candidate must earn
/// something to be picked.
pub fn select<'a>(candidates: &'a [Candidate], preference: &Preference) -> Option<&'a Candidate> {
    let mut eligible = candidates.iter().filter(|c| c.is_eligible());

    match preference {
        Preference::Profit => {
            let mut best: Option<&Candidate> = None;
            let mut best_profit = 0.0;
            for candidate in eligible {
                let profit = candidate.profit();
                if profit > best_profit {
                    best = Some(candidate);
                    best_profit = profit;
                }
            }
            best
        }
        Preference::Wcet => {
            let mut best: Option<&Candidate> = None;
            for candidate in eligible {
                if best.is_none_or(|b| candidate.package.wcet < b.package.wcet) {
                    best = Some(candidate);
                }
            }
            best
        }
        Preference::WorkId(id) => eligible.find(|c| c.package.work_str == *id),
    }
}

/// Holds the configured preference across refresh cycles.
///
/// A `wcet` or `workid` preference that finds nothing reverts to `profit`
/// for every later cycle.
#[derive(Debug)]
pub struct WorkSelector {
    preference: Preference,
}

impl WorkSelector {
    pub fn new(preference: Preference) -> Self {
        Self { preference }
    }

    pub fn preference(&self) -> &Preference {
        &self.preference
    }

    pub fn select(&mut self, candidates: &[Candidate]) -> Option<Candidate> {
        let chosen = select(candidates, &self.preference).cloned();
        if chosen.is_none() && self.preference != Preference::Profit {
            info!(
                preference = %self.preference,
                "No work matches mining preference, switching to profit"
            );
            self.preference = Preference::Profit;
        }
        chosen
    }
}
