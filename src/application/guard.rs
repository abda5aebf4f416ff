use crate::error::{PaymentError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Tracks which orders have a payment attempt in flight.
///
/// Cloning shares the underlying table, so one guard can be handed to every
/// orchestrator that may charge the same orders.
#[derive(Debug, Default, Clone)]
pub struct SessionGuard {
    inflight: Arc<DashMap<String, Uuid>>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `order_id` for `attempt_id`, failing with `Busy` if another attempt holds it.
    pub fn acquire(&self, order_id: &str, attempt_id: Uuid) -> Result<OrderLease> {
        match self.inflight.entry(order_id.to_string()) {
            Entry::Occupied(_) => Err(PaymentError::Busy {
                order_id: order_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(attempt_id);
                debug!(order_id, %attempt_id, "order lease acquired");
                Ok(OrderLease {
                    inflight: Arc::clone(&self.inflight),
                    order_id: order_id.to_string(),
                    attempt_id,
                })
            }
        }
    }

    pub fn is_locked(&self, order_id: &str) -> bool {
        self.inflight.contains_key(order_id)
    }

    pub fn holder(&self, order_id: &str) -> Option<Uuid> {
        self.inflight.get(order_id).map(|entry| *entry.value())
    }
}

/// Exclusive claim on an order. Released when dropped.
#[derive(Debug)]
pub struct OrderLease {
    inflight: Arc<DashMap<String, Uuid>>,
    order_id: String,
    attempt_id: Uuid,
}

impl OrderLease {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }
}

impl Drop for OrderLease {
    fn drop(&mut self) {
        let attempt_id = self.attempt_id;
        if self
            .inflight
            .remove_if(&self.order_id, |_, holder| *holder == attempt_id)
            .is_some()
        {
            debug!(order_id = %self.order_id, %attempt_id, "order lease released");
        }
    }
}
