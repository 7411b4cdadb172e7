use crate::domain::merchant::MerchantConfig;
use crate::domain::order::{Order, OrderStatus, refund_total};
use crate::domain::ports::{ConfigRepository, OrderRepository};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct OrderTables {
    rows: HashMap<Uuid, Order>,
    keys: HashMap<(String, String), Uuid>,
}

/// A thread-safe in-memory order ledger.
///
/// Rows and the `(store_id, out_trade_no)` index live behind one `RwLock`, so the
/// uniqueness check and the insert in `create_if_absent` happen under the same write guard.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn get_by_store_and_out_trade_no(
        &self,
        store_id: &str,
        out_trade_no: &str,
    ) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().await;
        let key = (store_id.to_string(), out_trade_no.to_string());
        Ok(tables.keys.get(&key).and_then(|id| tables.rows.get(id)).cloned())
    }

    async fn create_if_absent(&self, order: Order) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let key = (order.store_id.clone(), order.out_trade_no.clone());
        if tables.keys.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                store_id: key.0,
                out_trade_no: key.1,
            });
        }
        tables.keys.insert(key, order.id);
        tables.rows.insert(order.id, order);
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.rows.get_mut(&order.id) {
            Some(row) => {
                *row = order.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(order.out_trade_no.clone())),
        }
    }

    async fn sum_open_refunds(&self, link_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(refund_total(tables.rows.values(), link_id, |s| s != OrderStatus::Closed))
    }

    async fn apply_refund(&self, refund: &Order) -> Result<Order, StoreError> {
        let mut tables = self.tables.write().await;
        let missing = || StoreError::Missing(refund.out_trade_no.clone());
        let link_id = refund.link_id.ok_or_else(missing)?;
        if !tables.rows.contains_key(&refund.id) {
            return Err(missing());
        }

        let others = tables.rows.values().filter(|o| o.id != refund.id);
        let refunded = refund_total(others.chain([refund]), link_id, |s| s == OrderStatus::Success);
        let original = tables
            .rows
            .get_mut(&link_id)
            .ok_or_else(|| StoreError::Missing(link_id.to_string()))?;
        if refunded > original.total_fee {
            return Err(StoreError::RefundExceedsTotal {
                out_trade_no: original.out_trade_no.clone(),
                refunded,
                total_fee: original.total_fee,
            });
        }
        if original.refund_fee != refunded {
            original.refund_fee = refunded;
            original.touch();
        }
        let original = original.clone();
        tables.rows.insert(refund.id, refund.clone());
        Ok(original)
    }

    async fn list_by_store(&self, store_id: &str) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .rows
            .values()
            .filter(|o| o.store_id == store_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.out_trade_no.cmp(&b.out_trade_no))
        });
        Ok(orders)
    }
}

/// Merchant configuration keyed by store id.
#[derive(Default, Clone)]
pub struct InMemoryConfigStore {
    configs: Arc<RwLock<HashMap<String, MerchantConfig>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = MerchantConfig>) -> Self {
        let configs: HashMap<String, MerchantConfig> = configs
            .into_iter()
            .map(|c| (c.store_id.clone(), c))
            .collect();
        Self {
            configs: Arc::new(RwLock::new(configs)),
        }
    }

    /// Replaces the configuration of one merchant. The engine itself never writes here.
    pub async fn insert(&self, config: MerchantConfig) {
        self.configs
            .write()
            .await
            .insert(config.store_id.clone(), config);
    }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigStore {
    async fn get_by_store_id(&self, store_id: &str) -> Result<Option<MerchantConfig>, StoreError> {
        Ok(self.configs.read().await.get(store_id).cloned())
    }
}
