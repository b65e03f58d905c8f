//! # Permission Gate
//!
//! Yes/no decision taken before an operation touches storage.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each capability the event needs:                                  │
//! │     role table ∪ grants − revokes ── missing ──► Forbidden             │
//! │     capability in store.step_up_capabilities?                          │
//! │         no proof ──────────────────────────────► StepUpRequired        │
//! │         PIN does not verify ───────────────────► StepUpRejected        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every gate failure is permanent: resubmitting without a role change or
//! a correct PIN fails the same way.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use tracing::{debug, warn};

use tindahan_core::events::StepUpProof;
use tindahan_core::{Actor, Capability, ClientEvent, Role, StoreSettings};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Role Policy
// =============================================================================

/// Default capabilities per role, adjusted per actor by grants and revokes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl RolePolicy {
    pub fn defaults(role: Role) -> &'static [Capability] {
        const ALL: &[Capability] = &[
            Capability::SaleCreate,
            Capability::SaleVoid,
            Capability::SaleRefund,
            Capability::DiscountApply,
            Capability::StockAdjust,
            Capability::StockRestock,
            Capability::PaymentRecord,
        ];

        match role {
            Role::Owner | Role::Manager => ALL,
            Role::Cashier => &[Capability::SaleCreate, Capability::PaymentRecord],
            Role::StockClerk => &[Capability::StockAdjust, Capability::StockRestock],
        }
    }

    pub fn allows(&self, actor: &Actor, capability: Capability) -> bool {
        if actor.revokes.contains(&capability) {
            return false;
        }
        actor.grants.contains(&capability) || Self::defaults(actor.role).contains(&capability)
    }
}

// =============================================================================
// Step-up
// =============================================================================

/// Checks a step-up proof against the store's stored credential.
pub trait StepUpVerifier: Send + Sync {
    fn verify(&self, settings: &StoreSettings, proof: &StepUpProof) -> bool;
}

/// Verifies a manager PIN against the argon2 PHC hash in store settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinVerifier;

impl StepUpVerifier for PinVerifier {
    fn verify(&self, settings: &StoreSettings, proof: &StepUpProof) -> bool {
        let Some(hash) = settings.manager_pin_hash.as_deref() else {
            warn!(store_id = %settings.store_id, "Step-up required but no manager PIN is set");
            return false;
        };

        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(store_id = %settings.store_id, error = %e, "Stored manager PIN hash is malformed");
                return false;
            }
        };

        Argon2::default()
            .verify_password(proof.pin.as_bytes(), &parsed)
            .is_ok()
    }
}

// =============================================================================
// Gate
// =============================================================================

pub struct Gate {
    policy: RolePolicy,
    verifier: Box<dyn StepUpVerifier>,
}

impl Default for Gate {
    fn default() -> Self {
        Gate::new(RolePolicy, Box::new(PinVerifier))
    }
}

impl Gate {
    pub fn new(policy: RolePolicy, verifier: Box<dyn StepUpVerifier>) -> Self {
        Gate { policy, verifier }
    }

    pub fn check(
        &self,
        actor: &Actor,
        event: &ClientEvent,
        settings: &StoreSettings,
    ) -> EngineResult<()> {
        if actor.store_id.is_empty() {
            return Err(EngineError::Unauthorized("no store membership".to_string()));
        }

        let mut verified = false;
        for capability in event.required_capabilities() {
            if !self.policy.allows(actor, capability) {
                debug!(user_id = %actor.user_id, %capability, "Capability denied");
                return Err(EngineError::Forbidden { capability });
            }

            if !settings.requires_step_up(capability) || verified {
                continue;
            }

            let proof = event
                .step_up()
                .ok_or(EngineError::StepUpRequired { capability })?;
            if !self.verifier.verify(settings, proof) {
                warn!(user_id = %actor.user_id, %capability, "Manager PIN rejected");
                return Err(EngineError::StepUpRejected { capability });
            }
            // One valid PIN covers every capability of the same event.
            verified = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::PasswordHasher;
    use serde_json::json;

    fn actor(role: Role) -> Actor {
        Actor {
            user_id: "u-1".to_string(),
            store_id: "s1".to_string(),
            device_id: "d-1".to_string(),
            role,
            grants: Vec::new(),
            revokes: Vec::new(),
        }
    }

    fn void_event(pin: Option<&str>) -> ClientEvent {
        let mut payload = json!({"sale_id": "sale-1", "request_id": "v-1"});
        if let Some(pin) = pin {
            payload["step_up"] = json!({ "pin": pin });
        }
        ClientEvent::parse("void_sale", payload).unwrap()
    }

    fn settings_with_pin(pin: &str) -> StoreSettings {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .unwrap()
            .to_string();
        let mut settings = StoreSettings::defaults("s1");
        settings.manager_pin_hash = Some(hash);
        settings.step_up_capabilities = vec![Capability::SaleVoid];
        settings
    }

    #[test]
    fn test_role_defaults_grants_and_revokes() {
        let policy = RolePolicy;
        let mut cashier = actor(Role::Cashier);
        assert!(policy.allows(&cashier, Capability::SaleCreate));
        assert!(!policy.allows(&cashier, Capability::SaleVoid));

        cashier.grants.push(Capability::SaleVoid);
        assert!(policy.allows(&cashier, Capability::SaleVoid));

        let mut manager = actor(Role::Manager);
        manager.revokes.push(Capability::SaleRefund);
        assert!(!policy.allows(&manager, Capability::SaleRefund));
    }

    #[test]
    fn test_missing_capability_is_forbidden() {
        let gate = Gate::default();
        let err = gate
            .check(
                &actor(Role::Cashier),
                &void_event(None),
                &StoreSettings::defaults("s1"),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { capability: Capability::SaleVoid }));
    }

    #[test]
    fn test_step_up_pin() {
        let gate = Gate::default();
        let settings = settings_with_pin("4321");
        let manager = actor(Role::Manager);

        let err = gate.check(&manager, &void_event(None), &settings).unwrap_err();
        assert!(matches!(err, EngineError::StepUpRequired { .. }));

        let err = gate
            .check(&manager, &void_event(Some("0000")), &settings)
            .unwrap_err();
        assert!(matches!(err, EngineError::StepUpRejected { .. }));

        gate.check(&manager, &void_event(Some("4321")), &settings)
            .unwrap();
    }

    #[test]
    fn test_step_up_without_configured_pin_is_rejected() {
        let gate = Gate::default();
        let mut settings = StoreSettings::defaults("s1");
        settings.step_up_capabilities = vec![Capability::SaleVoid];

        let err = gate
            .check(&actor(Role::Owner), &void_event(Some("1234")), &settings)
            .unwrap_err();
        assert!(matches!(err, EngineError::StepUpRejected { .. }));
    }
}
