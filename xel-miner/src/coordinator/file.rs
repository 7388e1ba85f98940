//! Offline transport for test mining.
//!
//! The work list is read once from a JSON file shaped like a
//! `getMineableWork` reply. Long-poll never reports a new block, and every
//! submission step is answered with a synthetic success so solutions run
//! through the whole acknowledgment protocol without a network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{CoordinatorError, MineableWork, Request, Transport};
use crate::tracing::prelude::*;

const LONG_POLL_DELAY: Duration = Duration::from_secs(30);

pub struct FileTransport {
    path: PathBuf,
    work: Value,
    long_poll_delay: Duration,
}

impl FileTransport {
    /// Load and validate the work list at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref().to_path_buf();
        let text = tokio::fs::read_to_string(&path).await?;
        let work: Value = serde_json::from_str(&text)?;

        let parsed: MineableWork = serde_json::from_value(work.clone())?;
        info!(
            path = %path.display(),
            packages = parsed.work_packages.len(),
            "Test miner work list loaded"
        );

        Ok(Self {
            path,
            work,
            long_poll_delay: LONG_POLL_DELAY,
        })
    }

    /// Override how long a long-poll call blocks before reporting `timeout`.
    pub fn with_long_poll_delay(mut self, delay: Duration) -> Self {
        self.long_poll_delay = delay;
        self
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn call(&self, request: &Request) -> Result<Value, CoordinatorError> {
        match request {
            Request::GetMineableWork => {
                trace!(path = %self.path.display(), "Serving work list from file");
                Ok(self.work.clone())
            }
            Request::LongPoll => {
                tokio::time::sleep(self.long_poll_delay).await;
                Ok(json!({ "event": "timeout" }))
            }
            Request::GetApprovedBounties { .. } => {
                debug!(request = %request.describe(), "Test miner confirm");
                Ok(json!({ "approved": "true" }))
            }
            Request::BountyAnnouncement { .. } | Request::CreatePox { .. } => {
                info!(request = %request.describe(), "Test miner submission (not sent)");
                Ok(json!({}))
            }
        }
    }
}
