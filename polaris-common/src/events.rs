//! Domain event types for the Polaris event system
//!
//! Provides the shared `DomainEvent` enum and the `EventBus` used by the
//! tenant store, the onboarding state machine and the background engines.
//! Transport fan-out (WebSocket alerts, dashboard notifications) subscribes
//! to the bus; the core never talks to a socket directly.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Polaris domain events
///
/// Events are broadcast via the EventBus and can be serialized for
/// transport to the alerting/WebSocket layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A tenant was created (admin, GraphQL or CRM inbound)
    TenantCreated {
        tenant_id: Uuid,
        name: String,
        source: TenantSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A tenant's base fields or state changed
    TenantUpdated {
        tenant_id: Uuid,
        /// State after the update, serialized form
        state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A tenant was deleted through the admin action
    TenantDeleted {
        tenant_id: Uuid,
        actor_user_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Onboarding v1 state moved
    OnboardingStateChanged {
        tenant_id: Uuid,
        onboarding_id: Uuid,
        old_state: String,
        new_state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Onboarding v2 state moved
    OnboardingStateV2Changed {
        tenant_id: Uuid,
        onboarding_id: Uuid,
        old_state: String,
        new_state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One of the six setup steps toggled
    SetupStepCompleted {
        onboarding_id: Uuid,
        step: String,
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A seed run reached a terminal status
    SeedRunFinished {
        seed_id: Uuid,
        tenant_id: Option<Uuid>,
        status: String,
        error_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A My Compliance migration reached a terminal status.
    /// The transport layer delivers this to the initiator as an alert.
    MigrationFinished {
        migration_id: Uuid,
        tenant_id: Uuid,
        status: String,
        mapped_subtasks: String,
        initiator_user_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Blueprint prescription finished for a fresh tenant
    PrescriptionFinished {
        tenant_id: Uuid,
        status: String,
        error_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A CRM sync run finished (inbound webhook batch or outbound pull)
    CrmSyncFinished {
        synced: usize,
        failed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Where a tenant creation originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    Admin,
    Api,
    CrmInbound,
}

/// Broadcast bus for domain events
///
/// Thin wrapper over `tokio::sync::broadcast`. Emitting never blocks;
/// events published with no subscribers are dropped, which is fine for
/// notification-shaped traffic.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: DomainEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("Event dropped (no subscribers): {:?}", e.0);
        }
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(DomainEvent::TenantCreated {
            tenant_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            source: TenantSource::Admin,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            DomainEvent::TenantCreated { name, source, .. } => {
                assert_eq!(name, "Acme");
                assert_eq!(source, TenantSource::Admin);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit_lossy(DomainEvent::CrmSyncFinished {
            synced: 0,
            failed: 0,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DomainEvent::SetupStepCompleted {
            onboarding_id: Uuid::new_v4(),
            step: "control_prescription".to_string(),
            completed: true,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SetupStepCompleted");
        assert_eq!(json["step"], "control_prescription");
    }
}
