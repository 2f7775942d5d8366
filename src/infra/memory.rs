//! In-process order store.
//!
//! Behaves like the Postgres store (insert-only saves, recency ordering for
//! warmup) without a database. Outages and slow responses can be simulated.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    application::repos::{OrdersRepo, RepoError},
    domain::order::{Order, OrderUid},
};

const PRIMARY_KEY: &str = "orders_pkey";

#[derive(Default)]
struct State {
    orders: HashMap<OrderUid, Stored>,
    clock: u64,
}

struct Stored {
    order: Order,
    touched: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct InMemoryOrders {
    state: RwLock<State>,
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
}

impl Default for InMemoryOrders {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            unavailable: AtomicBool::new(false),
            latency: RwLock::new(None),
        }
    }

    /// Seed the store; later entries count as more recently touched.
    pub async fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for order in orders {
                let touched = state.tick();
                state
                    .orders
                    .insert(order.uid.clone(), Stored { order, touched });
            }
        }
        store
    }

    /// While unavailable every call fails with a persistence error.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, uid: &OrderUid) -> Option<Order> {
        self.state
            .read()
            .await
            .orders
            .get(uid)
            .map(|stored| stored.order.clone())
    }

    async fn enter(&self) -> Result<(), RepoError> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("order store is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl OrdersRepo for InMemoryOrders {
    async fn save(&self, order: &Order) -> Result<OrderUid, RepoError> {
        self.enter().await?;

        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.uid) {
            return Err(RepoError::Duplicate {
                constraint: PRIMARY_KEY.to_string(),
            });
        }
        let touched = state.tick();
        state.orders.insert(
            order.uid.clone(),
            Stored {
                order: order.clone(),
                touched,
            },
        );
        Ok(order.uid.clone())
    }

    async fn list_for_warmup(&self, limit: usize) -> Result<Vec<Order>, RepoError> {
        self.enter().await?;

        let state = self.state.read().await;
        let mut stored: Vec<&Stored> = state.orders.values().collect();
        stored.sort_by(|a, b| b.touched.cmp(&a.touched));
        Ok(stored
            .into_iter()
            .take(limit)
            .map(|stored| stored.order.clone())
            .collect())
    }

    async fn touch(&self, uid: &OrderUid) -> Result<(), RepoError> {
        self.enter().await?;

        let mut state = self.state.write().await;
        let touched = state.tick();
        match state.orders.get_mut(uid) {
            Some(stored) => {
                stored.touched = touched;
                Ok(())
            }
            None => Err(RepoError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(uid: &str) -> Order {
        Order {
            uid: OrderUid::new(uid),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_save_is_duplicate() {
        let store = InMemoryOrders::new();
        assert_eq!(store.save(&order("a")).await.ok(), Some(OrderUid::new("a")));

        let err = store.save(&order("a")).await.expect_err("duplicate");
        assert!(err.is_duplicate());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn warmup_lists_most_recently_touched_first() {
        let store = InMemoryOrders::with_orders([order("a"), order("b"), order("c")]).await;
        store.touch(&OrderUid::new("a")).await.expect("touch a");

        let uids: Vec<_> = store
            .list_for_warmup(2)
            .await
            .expect("list")
            .into_iter()
            .map(|order| order.uid)
            .collect();

        assert_eq!(uids, [OrderUid::new("a"), OrderUid::new("c")]);
    }

    #[tokio::test]
    async fn touch_of_unknown_uid_is_not_found() {
        let store = InMemoryOrders::new();
        let err = store.touch(&OrderUid::new("x")).await.expect_err("missing");
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let store = InMemoryOrders::new();
        store.set_available(false);

        assert!(matches!(
            store.save(&order("a")).await,
            Err(RepoError::Persistence(_))
        ));
        assert!(store.list_for_warmup(10).await.is_err());

        store.set_available(true);
        assert!(store.save(&order("a")).await.is_ok());
    }
}
