//! In-memory order store with the production uniqueness rule.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use stampede_core::{Order, OrderStatus, OrderStore, StoreError};

#[derive(Default)]
struct State {
    by_id: HashMap<i64, Order>,
    by_request: HashMap<(i64, i64), i64>,
}

/// [`OrderStore`] over hash maps, enforcing the
/// `(product_id, request_seq)` uniqueness constraint exactly like the
/// database schema does.
#[derive(Default)]
pub struct InMemoryOrderStore {
    state: Mutex<State>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    /// Snapshot of all committed orders.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (order.product_id, order.request_seq);
        if state.by_request.contains_key(&key) {
            return Err(StoreError::DuplicateRequest {
                product_id: order.product_id,
                request_seq: order.request_seq,
            });
        }
        state.by_request.insert(key, order.order_id);
        state.by_id.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: i64) -> Result<Order, StoreError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_request(&self, product_id: i64, request_seq: i64) -> Result<Order, StoreError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .by_request
            .get(&(product_id, request_seq))
            .and_then(|order_id| state.by_id.get(order_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let order = state.by_id.get_mut(&order_id).ok_or(StoreError::NotFound)?;
        if !order.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }
        order.status = status;
        if status == OrderStatus::Completed {
            order.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
