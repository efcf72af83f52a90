// Registry of live checkout sessions, keyed by an opaque session id

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::checkout::CheckoutController;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

struct CheckoutSession {
    controller: Arc<CheckoutController>,
    created_at: Instant,
}

impl CheckoutSession {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Shared checkout session registry. Removing a session unmounts its controller.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, CheckoutSession>>>,
    session_ttl: Duration,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub async fn insert(&self, controller: Arc<CheckoutController>) -> Uuid {
        let mut sessions = self.sessions.write().await;

        // Clean up expired sessions opportunistically
        self.cleanup_expired_sessions(&mut sessions);

        let id = Uuid::new_v4();
        debug!(session_id = %id, booking_ref = %controller.booking_ref(), "Registering checkout session");
        sessions.insert(
            id,
            CheckoutSession {
                controller,
                created_at: Instant::now(),
            },
        );
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<CheckoutController>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|s| !s.is_expired(self.session_ttl))
            .map(|s| Arc::clone(&s.controller))
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(id) {
            Some(session) => {
                session.controller.unmount();
                debug!(session_id = %id, "Removed checkout session");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn cleanup_expired_sessions(&self, sessions: &mut HashMap<Uuid, CheckoutSession>) -> usize {
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, session)| session.is_expired(self.session_ttl))
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.controller.unmount();
                debug!(session_id = %id, "Cleaned up expired checkout session");
            }
        }
        expired.len()
    }

    /// Manually trigger cleanup of expired sessions
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.cleanup_expired_sessions(&mut sessions)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::types::BookingStatus;
    use crate::checkout::testing::{booking, config, FakeBookingApi, FakeGateway, FakeProvider};

    fn controller() -> Arc<CheckoutController> {
        let api = FakeBookingApi::with_booking(booking("EVT-1", BookingStatus::PendingPayment, None));
        CheckoutController::new("EVT-1", api, FakeProvider::new(FakeGateway::new()), &config())
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        let ctrl = controller();
        let id = registry.insert(ctrl.clone()).await;

        assert!(registry.get(&id).await.is_some());
        assert!(registry.remove(&id).await);
        assert!(!ctrl.is_live());
        assert!(registry.get(&id).await.is_none());
        assert!(!registry.remove(&id).await);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_unmounted() {
        let registry = SessionRegistry::new().with_ttl(Duration::from_millis(10));
        let ctrl = controller();
        let id = registry.insert(ctrl.clone()).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.get(&id).await.is_none());
        assert_eq!(registry.cleanup().await, 1);
        assert!(!ctrl.is_live());
        assert_eq!(registry.len().await, 0);
    }
}
