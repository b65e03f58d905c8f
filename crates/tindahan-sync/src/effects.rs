//! Non-critical side effects.
//!
//! Written after the primary operation has committed. A failure here is
//! logged and reported to the caller, but never changes the operation's
//! result or its idempotency record.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use tindahan_core::{clock, Actor, AuditEntry, DeviceCheckpoint};
use tindahan_db::{DbError, SharedStore};

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Audit(AuditEntry),
    Checkpoint(DeviceCheckpoint),
}

impl SideEffect {
    pub fn audit(
        actor: &Actor,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: Value,
    ) -> Self {
        SideEffect::Audit(AuditEntry {
            id: Uuid::new_v4().to_string(),
            store_id: actor.store_id.clone(),
            actor_id: actor.user_id.clone(),
            device_id: actor.device_id.clone(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details,
            created_at: clock::now(),
        })
    }

    pub fn checkpoint(actor: &Actor, cursor: String) -> Self {
        SideEffect::Checkpoint(DeviceCheckpoint {
            store_id: actor.store_id.clone(),
            device_id: actor.device_id.clone(),
            cursor,
            pulled_at: clock::now(),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            SideEffect::Audit(_) => "audit",
            SideEffect::Checkpoint(_) => "checkpoint",
        }
    }
}

/// A side effect that could not be written.
#[derive(Debug)]
pub struct EffectFailure {
    pub effect: &'static str,
    pub error: DbError,
}

/// Writes side effects, collecting failures instead of returning early.
#[derive(Clone)]
pub struct SideEffectRunner {
    store: SharedStore,
}

impl SideEffectRunner {
    pub fn new(store: SharedStore) -> Self {
        SideEffectRunner { store }
    }

    pub async fn run(&self, effects: Vec<SideEffect>) -> Vec<EffectFailure> {
        let mut failures = Vec::new();

        for effect in effects {
            let name = effect.name();
            let result = match &effect {
                SideEffect::Audit(entry) => self.store.append_audit(entry).await,
                SideEffect::Checkpoint(checkpoint) => self.store.save_checkpoint(checkpoint).await,
            };

            match result {
                Ok(()) => debug!(effect = name, "Side effect written"),
                Err(error) => {
                    warn!(effect = name, error = %error, "Side effect failed; continuing");
                    failures.push(EffectFailure { effect: name, error });
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tindahan_core::Role;
    use tindahan_db::{AuditStore, MemoryStore, SyncEventStore};

    fn actor() -> Actor {
        Actor {
            user_id: "u-1".to_string(),
            store_id: "s1".to_string(),
            device_id: "d-1".to_string(),
            role: Role::Owner,
            grants: Vec::new(),
            revokes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_effects_are_written() {
        let store = Arc::new(MemoryStore::new());
        let runner = SideEffectRunner::new(store.clone());

        let failures = runner
            .run(vec![
                SideEffect::audit(&actor(), "restock", "product", "p-1", json!({"qty": 5})),
                SideEffect::checkpoint(&actor(), "v1:42".to_string()),
            ])
            .await;

        assert!(failures.is_empty());
        let audit = store.audit_entries("s1", 10).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "restock");
        let checkpoint = store.get_checkpoint("s1", "d-1").await.unwrap().unwrap();
        assert_eq!(checkpoint.cursor, "v1:42");
    }
}
