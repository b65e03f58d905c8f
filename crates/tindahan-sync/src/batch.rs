//! # Batch Push
//!
//! Replays a device's queued events in array order. Each event stands on
//! its own: a failure is classified, recorded and reported, and the next
//! event still runs.
//!
//! ## Per Event
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  event_id empty ─────────────────────────────► failed_permanent         │
//! │  stored record applied / duplicate_ignored ──► duplicate_ignored        │
//! │                                                (stored result echoed)   │
//! │  parse event_type + payload ── error ────────► failed_permanent         │
//! │  engine.execute(key = natural key | event_id)                           │
//! │     Ok, first application ───────────────────► applied                  │
//! │     Ok, replayed by the guard ───────────────► duplicate_ignored        │
//! │     Err ── classify ─── Retryable ───────────► failed_retry             │
//! │                    └─── Permanent ───────────► failed_permanent         │
//! │  save SyncEventRecord (attempt_count + 1)                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use ts_rs::TS;

use tindahan_core::{
    clock, Actor, ClientEvent, SyncEventEnvelope, SyncEventRecord, SyncEventStatus,
    ValidationError,
};

use crate::engine::Engine;
use crate::error::{classify, EngineError, EngineResult, ErrorCode, FailureClass};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PushRequest {
    pub events: Vec<SyncEventEnvelope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EventError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub details: Option<Value>,
}

impl EventError {
    pub fn from_engine(err: &EngineError) -> Self {
        EventError {
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EventResult {
    pub event_id: String,
    pub status: SyncEventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PushResponse {
    pub results: Vec<EventResult>,
    #[ts(as = "String")]
    pub server_time: DateTime<Utc>,
}

// =============================================================================
// Processor
// =============================================================================

impl Engine {
    /// Applies a pushed batch sequentially, in the order given.
    pub async fn push(
        &self,
        actor: &Actor,
        events: Vec<SyncEventEnvelope>,
    ) -> EngineResult<PushResponse> {
        if events.len() > self.config.max_batch_events {
            return Err(EngineError::BatchTooLarge {
                size: events.len(),
                max: self.config.max_batch_events,
            });
        }

        info!(
            store_id = %actor.store_id,
            device_id = %actor.device_id,
            count = events.len(),
            "Processing pushed batch"
        );

        let mut results = Vec::with_capacity(events.len());
        for envelope in events {
            results.push(self.push_one(actor, envelope).await);
        }

        Ok(PushResponse {
            results,
            server_time: clock::now(),
        })
    }

    async fn push_one(&self, actor: &Actor, envelope: SyncEventEnvelope) -> EventResult {
        let event_id = envelope.event_id.trim().to_string();
        if event_id.is_empty() {
            let err = EngineError::Validation(ValidationError::required("event_id"));
            return EventResult {
                event_id,
                status: SyncEventStatus::FailedPermanent,
                data: None,
                error: Some(EventError::from_engine(&err)),
            };
        }

        let prior = match self.store.get_sync_event(&actor.store_id, &event_id).await {
            Ok(prior) => prior,
            Err(e) => {
                let err = EngineError::from(e);
                warn!(event_id = %event_id, error = %err, "Sync event lookup failed");
                return EventResult {
                    event_id,
                    status: SyncEventStatus::FailedRetry,
                    data: None,
                    error: Some(EventError::from_engine(&err)),
                };
            }
        };

        if let Some(prior) = prior.as_ref().filter(|p| p.status.is_settled()) {
            debug!(event_id = %event_id, "Event already settled; echoing stored result");
            return EventResult {
                event_id,
                status: SyncEventStatus::DuplicateIgnored,
                data: prior.result.clone(),
                error: None,
            };
        }

        let outcome = self.apply_envelope(actor, &event_id, &envelope).await;

        let (status, data, error, last_error) = match outcome {
            Ok(response) => {
                let status = if response.replayed {
                    SyncEventStatus::DuplicateIgnored
                } else {
                    SyncEventStatus::Applied
                };
                (status, Some(response.data), None, None)
            }
            Err(err) => {
                let status = match classify(&err) {
                    FailureClass::Retryable => SyncEventStatus::FailedRetry,
                    FailureClass::Permanent => SyncEventStatus::FailedPermanent,
                };
                warn!(
                    event_id = %event_id,
                    event_type = %envelope.event_type,
                    ?status,
                    error = %err,
                    "Pushed event failed"
                );
                (status, None, Some(EventError::from_engine(&err)), Some(err.to_string()))
            }
        };

        let now = clock::now();
        let record = SyncEventRecord {
            event_id: event_id.clone(),
            store_id: actor.store_id.clone(),
            device_id: if envelope.device_id.is_empty() {
                actor.device_id.clone()
            } else {
                envelope.device_id.clone()
            },
            event_type: envelope.event_type.clone(),
            payload: envelope.payload.clone(),
            status,
            attempt_count: prior.as_ref().map_or(0, |p| p.attempt_count) + 1,
            last_error,
            result: data.clone(),
            created_at: prior.as_ref().map_or(now, |p| p.created_at),
            updated_at: now,
        };
        if let Err(e) = self.store.save_sync_event(&record).await {
            warn!(event_id = %event_id, error = %e, "Failed to persist sync event record");
        }

        EventResult {
            event_id,
            status,
            data,
            error,
        }
    }

    async fn apply_envelope(
        &self,
        actor: &Actor,
        event_id: &str,
        envelope: &SyncEventEnvelope,
    ) -> EngineResult<crate::engine::OperationResponse> {
        let event = ClientEvent::parse(&envelope.event_type, envelope.payload.clone())?;
        let key = event.natural_key().unwrap_or(event_id).to_string();
        self.execute(actor, &event, Some(&key)).await
    }
}
