//! Scripted invoker and recording sink shared by runtime tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use goosebot_agent::{AgentInvoker, InvocationError, InvocationRequest, InvocationResult};

use crate::notification::{Destination, MessageRef, NotificationError, NotificationSink};

#[derive(Debug, Clone)]
pub(crate) enum ScriptedReply {
    Stdout(String),
    MissingBinary,
}

pub(crate) struct ScriptedInvoker {
    reply: ScriptedReply,
    delay: Duration,
    requests: Mutex<Vec<InvocationRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedInvoker {
    pub(crate) fn stdout(text: &str) -> Self {
        Self::new(ScriptedReply::Stdout(text.to_string()))
    }

    pub(crate) fn missing_binary() -> Self {
        Self::new(ScriptedReply::MissingBinary)
    }

    fn new(reply: ScriptedReply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, InvocationError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.reply {
            ScriptedReply::Stdout(text) => Ok(InvocationResult {
                stdout: text.clone(),
                stderr: String::new(),
                exit_status: Some(0),
            }),
            ScriptedReply::MissingBinary => Err(InvocationError::Spawn {
                executable: "goose".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkCall {
    Post {
        destination: Destination,
        body: String,
    },
    Update {
        message: MessageRef,
        body: String,
    },
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    fail_posts: bool,
    next_ts: AtomicUsize,
}

impl RecordingSink {
    pub(crate) fn failing() -> Self {
        Self {
            fail_posts: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn post(
        &self,
        destination: &Destination,
        body: &str,
    ) -> Result<MessageRef, NotificationError> {
        self.calls.lock().expect("calls lock").push(SinkCall::Post {
            destination: destination.clone(),
            body: body.to_string(),
        });
        if self.fail_posts {
            return Err(NotificationError::Rejected {
                method: "chat.postMessage".to_string(),
                error: "channel_not_found".to_string(),
            });
        }
        let ts = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            channel_id: destination.channel_id.clone(),
            ts: format!("{ts}.0"),
        })
    }

    async fn update(&self, message: &MessageRef, body: &str) -> Result<(), NotificationError> {
        self.calls.lock().expect("calls lock").push(SinkCall::Update {
            message: message.clone(),
            body: body.to_string(),
        });
        Ok(())
    }
}
