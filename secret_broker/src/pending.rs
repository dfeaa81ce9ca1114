// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pending-request table: suspended continuations awaiting user input.

use std::sync::Arc;

use dashmap::DashMap;
use secrets_core::{Result, SecretsError};
use secret_plugins::{InteractionEvent, InteractionRelay};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The operation a suspended request will continue as once input arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    CreateCustomLockCollection,
    SetCollectionUserInputSecret,
    SetCollectionSecret,
    SetStandaloneDeviceLockUserInputSecret,
    SetStandaloneCustomLockUserInputSecret,
    SetStandaloneCustomLockSecret,
    GetCollectionSecret,
    GetStandaloneSecret,
    FindCollectionSecrets,
    DeleteCollectionSecret,
    ModifyLockCode,
    ProvideLockCode,
    UserInput,
}

struct PendingRequest {
    caller_pid: u32,
    kind: PendingKind,
    sender: oneshot::Sender<Result<Vec<u8>>>,
}

/// Maps request ids to suspended continuations. The user-input-completed
/// event looks up the entry and resumes the awaiting flow.
#[derive(Default)]
pub struct PendingRequestTable {
    entries: DashMap<u64, PendingRequest>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a suspension and return the receiver the flow awaits on.
    pub fn register(
        &self,
        caller_pid: u32,
        request_id: u64,
        kind: PendingKind,
    ) -> oneshot::Receiver<Result<Vec<u8>>> {
        let (sender, receiver) = oneshot::channel();
        self.entries.insert(
            request_id,
            PendingRequest {
                caller_pid,
                kind,
                sender,
            },
        );
        receiver
    }

    /// Drop a suspension whose interaction never started.
    pub fn discard(&self, request_id: u64) {
        self.entries.remove(&request_id);
    }

    /// Resolve a suspension with the interaction outcome. Returns false when
    /// no request with that id is waiting.
    pub fn complete_user_input(&self, request_id: u64, outcome: Result<Vec<u8>>) -> bool {
        match self.entries.remove(&request_id) {
            Some((_, pending)) => {
                debug!(
                    request_id,
                    caller_pid = pending.caller_pid,
                    kind = ?pending.kind,
                    "user input interaction completed"
                );
                // The flow may have been dropped; resolution is best-effort.
                let _ = pending.sender.send(outcome);
                true
            },
            None => {
                warn!(request_id, "user input completed for unknown pending request");
                false
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Relay handed to authentication plugins; completion events resolve the
    /// matching pending entry.
    pub fn relay(self: &Arc<Self>) -> InteractionRelay {
        let table = Arc::clone(self);
        InteractionRelay::new(move |event| match event {
            InteractionEvent::UserInputCompleted {
                request_id, result, ..
            } => {
                table.complete_user_input(request_id, result);
            },
            InteractionEvent::AuthenticationCompleted { request_id, .. } => {
                // Reserved for unlocking master-locked collections.
                debug!(request_id, "authentication completed");
            },
        })
    }
}

/// Error used when the completion channel drops without a resolution.
pub(crate) fn interaction_channel_closed() -> SecretsError {
    SecretsError::Unknown("interaction completion channel closed".into())
}
