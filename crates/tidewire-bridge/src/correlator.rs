// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch correlation engine.
//!
//! Turns N independently resolved operations into one ordered response.
//!
//! ```text
//!              ┌──────────────────────────────────────────┐
//!              │               RUNNING                    │
//!              │  slots: [Pending, Succeeded, Pending..]  │
//!              └──────────────┬──────────────┬────────────┘
//!        every slot resolved  │              │  timer fired
//!        (timer dropped)      ▼              ▼  (pending → Failed)
//!              ┌──────────────────────────────────────────┐
//!              │               COMPLETED                  │
//!              │   responder invoked exactly once         │
//!              └──────────────────────────────────────────┘
//! ```
//!
//! Each batch runs on its own task that exclusively owns the [`BatchState`].
//! Every operation passes a permission check before it is dispatched. The
//! checks are polled on the same task and dispatched in request order. A
//! denied terminal operation is rejected through its virtual connection.
//! Virtual connections post [`SlotUpdate`]s over a channel, and the timer is
//! one more branch of the same `select!`. Both completion paths
//! go through [`BatchState::respond`], which takes the responder out of its
//! `Option`, so a second trigger is a no-op.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use serde::Serialize;
use serde_json::{Map, Value};
use tidewire_protocol::{Codec, ErrorEvent, OperationKind, OperationResult, ParsedOperation};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::auth::AuthContext;
use crate::connection::{Connection, DetachedConnection, SlotUpdate, VirtualConnection};
use crate::distribution::Distributor;
use crate::error::{BridgeError, Result};
use crate::permission::PermissionHandler;

/// Error recorded for operations still pending when the batch times out.
pub const TIMEOUT_ERROR: &str = "Request exceeded timeout before a response was received.";

/// Result cell for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// No outcome yet.
    Pending,
    /// Succeeded with the given payload fields.
    Succeeded(Map<String, Value>),
    /// Failed; fields include at least `error`.
    Failed(Map<String, Value>),
}

impl SlotState {
    /// Slot state for a wire result.
    pub fn from_result(result: OperationResult) -> Self {
        if result.success {
            Self::Succeeded(result.fields)
        } else {
            Self::Failed(result.fields)
        }
    }

    /// Failed state carrying only an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed(OperationResult::failed(error).fields)
    }

    /// Whether the slot still awaits an outcome.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Wire form of a resolved slot.
    pub fn to_result(&self) -> Option<OperationResult> {
        match self {
            Self::Pending => None,
            Self::Succeeded(fields) => Some(OperationResult {
                success: true,
                fields: fields.clone(),
            }),
            Self::Failed(fields) => Some(OperationResult {
                success: false,
                fields: fields.clone(),
            }),
        }
    }
}

/// Summary over all slots of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateResult {
    /// Every operation succeeded.
    Success,
    /// Some, not all, operations succeeded.
    PartialSuccess,
    /// No operation succeeded.
    Failure,
}

/// Summarize resolved slots.
///
/// A pending slot is a broken invariant and is reported, never skipped.
pub fn aggregate(slots: &[SlotState]) -> Result<AggregateResult> {
    let mut succeeded = 0;
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            SlotState::Pending => return Err(BridgeError::UnresolvedSlot { index }),
            SlotState::Succeeded(_) => succeeded += 1,
            SlotState::Failed(_) => {}
        }
    }

    Ok(if succeeded == slots.len() {
        AggregateResult::Success
    } else if succeeded == 0 {
        AggregateResult::Failure
    } else {
        AggregateResult::PartialSuccess
    })
}

/// Body of a completed batch: `{result, body}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponse {
    /// Aggregate over all operations.
    pub result: AggregateResult,
    /// Per-operation results in request order.
    pub body: Vec<OperationResult>,
}

/// What a batch hands to its responder.
pub type BatchOutcome = Result<BatchResponse>;

/// Single-shot response callback.
pub type Responder = Box<dyn FnOnce(BatchOutcome) + Send>;

/// Slots and responder of one batch.
pub struct BatchState {
    slots: Vec<SlotState>,
    responder: Option<Responder>,
}

impl std::fmt::Debug for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchState")
            .field("slots", &self.slots)
            .field("responded", &self.has_responded())
            .finish()
    }
}

impl BatchState {
    /// Allocate `len` pending slots.
    pub fn new(len: usize, responder: Responder) -> Self {
        Self {
            slots: vec![SlotState::Pending; len],
            responder: Some(responder),
        }
    }

    /// Slots in request order.
    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    /// Number of unresolved slots.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.is_pending()).count()
    }

    /// Whether the responder has been invoked.
    pub fn has_responded(&self) -> bool {
        self.responder.is_none()
    }

    /// Resolve slot `index`. Returns false when the slot was already
    /// resolved, is out of range, or `state` is itself pending.
    pub fn settle(&mut self, index: usize, state: SlotState) -> bool {
        if state.is_pending() {
            return false;
        }
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_pending() => {
                *slot = state;
                true
            }
            Some(_) => {
                debug!(index, "Slot already resolved");
                false
            }
            None => {
                warn!(index, len = self.slots.len(), "Outcome for unknown slot");
                false
            }
        }
    }

    /// Respond if every slot is resolved. Returns true if this call responded.
    pub fn check_complete(&mut self) -> bool {
        if self.has_responded() || self.pending() > 0 {
            return false;
        }
        self.respond()
    }

    /// Fail every pending slot and respond. No-op once responded.
    pub fn on_timeout(&mut self) -> bool {
        if self.has_responded() {
            return false;
        }
        let mut timed_out = 0;
        for slot in self.slots.iter_mut().filter(|s| s.is_pending()) {
            *slot = SlotState::failed(TIMEOUT_ERROR);
            timed_out += 1;
        }
        warn!(timed_out, "Batch timed out");
        self.respond()
    }

    fn respond(&mut self) -> bool {
        let Some(responder) = self.responder.take() else {
            return false;
        };

        let outcome = aggregate(&self.slots).and_then(|result| {
            let body = self
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| {
                    slot.to_result()
                        .ok_or(BridgeError::UnresolvedSlot { index })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(BatchResponse { result, body })
        });

        match &outcome {
            Ok(response) => debug!(result = ?response.result, "Batch completed"),
            Err(e) => error!(error = %e, "Batch completed with an unresolved slot"),
        }

        responder(outcome);
        true
    }
}

/// Dispatches batches and correlates their outcomes.
#[derive(Clone)]
pub struct BatchCorrelator {
    permission: Arc<dyn PermissionHandler>,
    distributor: Arc<dyn Distributor>,
    codec: Arc<dyn Codec>,
    timeout: Duration,
}

impl BatchCorrelator {
    /// Create a correlator with the shared collaborators and batch timeout.
    pub fn new(
        permission: Arc<dyn PermissionHandler>,
        distributor: Arc<dyn Distributor>,
        codec: Arc<dyn Codec>,
        timeout: Duration,
    ) -> Self {
        Self {
            permission,
            distributor,
            codec,
            timeout,
        }
    }

    /// Batch timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a batch to completion and return its outcome.
    pub async fn execute(
        &self,
        auth: Arc<AuthContext>,
        operations: Vec<ParsedOperation>,
    ) -> BatchOutcome {
        let (tx, rx) = oneshot::channel();
        self.start(
            auth,
            operations,
            Box::new(move |outcome| {
                // The caller may have gone away; nothing to do then.
                let _ = tx.send(outcome);
            }),
        );
        rx.await.unwrap_or_else(|_| {
            Err(BridgeError::Internal(
                "Batch ended without a response.".to_string(),
            ))
        })
    }

    /// Spawn the task driving a batch. `responder` is invoked exactly once.
    pub fn start(
        &self,
        auth: Arc<AuthContext>,
        operations: Vec<ParsedOperation>,
        responder: Responder,
    ) -> JoinHandle<()> {
        let batch_id = uuid::Uuid::new_v4();
        let span = info_span!("batch", %batch_id, operations = operations.len());
        tokio::spawn(self.clone().drive(auth, operations, responder).instrument(span))
    }

    async fn drive(
        self,
        auth: Arc<AuthContext>,
        operations: Vec<ParsedOperation>,
        responder: Responder,
    ) {
        let mut state = BatchState::new(operations.len(), responder);
        let timer = tokio::time::sleep(self.timeout);
        tokio::pin!(timer);

        let (updates_tx, mut updates) = mpsc::unbounded_channel::<SlotUpdate>();
        let mut decisions = FuturesOrdered::new();

        for (index, operation) in operations.into_iter().enumerate() {
            let connection: Arc<dyn Connection> = match operation.kind {
                OperationKind::FireAndForget => {
                    Arc::new(DetachedConnection::new(Arc::clone(&auth)))
                }
                OperationKind::Terminal => Arc::new(VirtualConnection::new(
                    index,
                    Arc::clone(&auth),
                    operation.message.clone(),
                    Arc::clone(&self.codec),
                    updates_tx.clone(),
                )),
            };
            decisions.push_back(self.check(index, operation, connection));
        }
        drop(updates_tx);

        state.check_complete();

        while !state.has_responded() {
            tokio::select! {
                Some(decision) = decisions.next() => {
                    self.dispatch(&mut state, decision);
                    state.check_complete();
                }
                Some(update) = updates.recv() => {
                    state.settle(update.index, update.state);
                    state.check_complete();
                }
                _ = &mut timer => {
                    state.on_timeout();
                }
            }
        }
    }

    /// Permission check for one operation. Checks run concurrently; decisions
    /// come back in request order.
    fn check(
        &self,
        index: usize,
        operation: ParsedOperation,
        connection: Arc<dyn Connection>,
    ) -> impl Future<Output = Decision> + Send + 'static {
        let permission = Arc::clone(&self.permission);

        async move {
            let auth = connection.auth_context();
            let permitted = match permission
                .can_perform_action(auth, &operation.message, connection.as_ref())
                .await
            {
                Ok(permitted) => permitted,
                Err(e) => {
                    warn!(index, error = %e, "Permission check failed");
                    false
                }
            };

            Decision {
                index,
                operation,
                connection,
                permitted,
            }
        }
    }

    /// Hand a permitted operation to the distributor, or fail its slot.
    fn dispatch(&self, state: &mut BatchState, decision: Decision) {
        let Decision {
            index,
            operation,
            connection,
            permitted,
        } = decision;

        if !permitted {
            debug!(index, action = operation.message.action(), "Message denied");
            let reason = format!(
                "Message denied. Action \"{}\" is not permitted.",
                operation.message.action()
            );
            match operation.kind {
                OperationKind::FireAndForget => {
                    state.settle(index, SlotState::failed(reason));
                }
                OperationKind::Terminal => {
                    connection.reject(ErrorEvent::MessageDenied, &reason);
                }
            }
            return;
        }

        self.distributor.distribute(connection, operation.message);
        if operation.kind == OperationKind::FireAndForget {
            state.settle(index, SlotState::Succeeded(Map::new()));
        }
    }
}

/// Outcome of the permission check for one operation.
struct Decision {
    index: usize,
    operation: ParsedOperation,
    connection: Arc<dyn Connection>,
    permitted: bool,
}
