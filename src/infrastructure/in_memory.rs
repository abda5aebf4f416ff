use crate::domain::order::OrderSnapshot;
use crate::domain::ports::OrderStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A thread-safe in-memory store for order snapshots.
///
/// `refresh` has nothing to reload from, so it only counts how often the
/// orchestrator asked for fresh totals.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, OrderSnapshot>>>,
    refreshes: Arc<RwLock<HashMap<String, usize>>>,
    total_refreshes: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: OrderSnapshot) {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.clone(), order);
    }

    pub async fn refresh_count(&self, order_id: &str) -> usize {
        let refreshes = self.refreshes.read().await;
        refreshes.get(order_id).copied().unwrap_or(0)
    }

    pub fn total_refreshes(&self) -> usize {
        self.total_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<OrderSnapshot>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn refresh(&self, order_id: &str) -> Result<()> {
        let mut refreshes = self.refreshes.write().await;
        *refreshes.entry(order_id.to_string()).or_default() += 1;
        self.total_refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::MinorUnits;

    #[tokio::test]
    async fn test_in_memory_order_store() {
        let store = InMemoryOrderStore::new();
        let order = OrderSnapshot::new("ord_1", MinorUnits(12000));

        store.insert(order.clone()).await;
        let retrieved = store.get("ord_1").await.unwrap().unwrap();
        assert_eq!(retrieved, order);

        assert!(store.get("ord_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_is_counted_per_order() {
        let store = InMemoryOrderStore::new();
        store.refresh("ord_1").await.unwrap();
        store.refresh("ord_1").await.unwrap();
        store.refresh("ord_2").await.unwrap();

        assert_eq!(store.refresh_count("ord_1").await, 2);
        assert_eq!(store.refresh_count("ord_3").await, 0);
        assert_eq!(store.total_refreshes(), 3);
    }
}
