//! Talking to the remote coordinator.
//!
//! A [`Transport`] turns a [`Request`] into a parsed JSON value. The
//! [`Coordinator`] wrapper decodes those values into typed responses.
//! Two transports exist: [`HttpTransport`] for a real node and
//! [`FileTransport`] for offline test mining.

mod error;
mod file;
mod http;
mod messages;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use error::CoordinatorError;
pub use file::FileTransport;
pub use http::{HttpConfig, HttpTransport, LONG_POLL_TIMEOUT};
pub use messages::{
    Approval, EventField, LongPollEvent, MineableWork, PackageDescriptor, Request,
    SubmitResponse, DUPLICATE_TRANSACTION,
};

use crate::tracing::prelude::*;

/// Sends one request and returns the coordinator's JSON answer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &Request) -> Result<Value, CoordinatorError>;
}

/// Typed front end over a [`Transport`].
#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<dyn Transport>,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetch the list of mineable work packages.
    pub async fn fetch_work(&self) -> Result<MineableWork, CoordinatorError> {
        let value = self.transport.call(&Request::GetMineableWork).await?;
        if let Some(err) = value.get("errorDescription").and_then(Value::as_str) {
            if value.get("work_packages").is_none() {
                return Err(CoordinatorError::Decode(err.to_string()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for the next coordinator event.
    pub async fn long_poll(&self) -> Result<LongPollEvent, CoordinatorError> {
        let value = self.transport.call(&Request::LongPoll).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send one submission step.
    pub async fn submit(&self, request: &Request) -> Result<SubmitResponse, CoordinatorError> {
        let value = self.transport.call(request).await?;
        let response: SubmitResponse = serde_json::from_value(value)?;
        if let Some(err) = &response.error_description {
            debug!(request = request.request_type(), error = %err, "Submit response error");
        }
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted in-memory transport.

    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    /// Answers each request type from its own queue of scripted replies and
    /// records every request seen.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<Vec<(&'static str, VecDeque<Result<Value, String>>)>>,
        fallback: Mutex<Vec<(&'static str, Value)>>,
        pub seen: Mutex<Vec<Request>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Queue one reply for `request_type`.
        pub fn push(&self, request_type: &'static str, reply: Value) {
            self.push_result(request_type, Ok(reply));
        }

        /// Queue one transport failure for `request_type`.
        pub fn push_failure(&self, request_type: &'static str) {
            self.push_result(request_type, Err("scripted failure".into()));
        }

        fn push_result(&self, request_type: &'static str, reply: Result<Value, String>) {
            let mut replies = self.replies.lock();
            match replies.iter_mut().find(|(t, _)| *t == request_type) {
                Some((_, queue)) => queue.push_back(reply),
                None => replies.push((request_type, VecDeque::from([reply]))),
            }
        }

        /// Reply used once the queue for `request_type` is empty.
        pub fn set_fallback(&self, request_type: &'static str, reply: Value) {
            let mut fallback = self.fallback.lock();
            fallback.retain(|(t, _)| *t != request_type);
            fallback.push((request_type, reply));
        }

        pub fn seen_of(&self, request_type: &str) -> Vec<Request> {
            self.seen
                .lock()
                .iter()
                .filter(|r| r.request_type() == request_type)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn call(&self, request: &Request) -> Result<Value, CoordinatorError> {
            self.seen.lock().push(request.clone());
            let kind = request.request_type();

            let scripted = self
                .replies
                .lock()
                .iter_mut()
                .find(|(t, _)| *t == kind)
                .and_then(|(_, q)| q.pop_front());

            match scripted {
                Some(Ok(value)) => Ok(value),
                Some(Err(msg)) => Err(CoordinatorError::Io(std::io::Error::other(msg))),
                None => self
                    .fallback
                    .lock()
                    .iter()
                    .find(|(t, _)| *t == kind)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        CoordinatorError::Io(std::io::Error::other(format!(
                            "no scripted reply for {}",
                            kind
                        )))
                    }),
            }
        }
    }
}
