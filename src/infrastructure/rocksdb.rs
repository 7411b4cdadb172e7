use crate::domain::order::{Order, OrderStatus, refund_total};
use crate::domain::ports::OrderRepository;
use crate::error::StoreError;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for order rows, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for the unique `(store_id, out_trade_no)` index.
pub const CF_ORDER_KEYS: &str = "order_keys";

/// A persistent order ledger using RocksDB.
///
/// Rows and the uniqueness index live in separate Column Families and are written in one
/// `WriteBatch`. Writes are serialized by a mutex so the index check and the insert, or a
/// refund total and the row it is computed from, cannot interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBOrderStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBOrderStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_keys = ColumnFamilyDescriptor::new(CF_ORDER_KEYS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_keys])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("{name} column family not found")))
    }

    fn index_key(store_id: &str, out_trade_no: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(store_id.len() + out_trade_no.len() + 1);
        key.extend_from_slice(store_id.as_bytes());
        key.push(0);
        key.extend_from_slice(out_trade_no.as_bytes());
        key
    }

    fn scan(&self) -> Result<Vec<Order>, StoreError> {
        let handle = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice::<Order>(&value)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderRepository for RocksDBOrderStore {
    async fn get_by_store_and_out_trade_no(
        &self,
        store_id: &str,
        out_trade_no: &str,
    ) -> Result<Option<Order>, StoreError> {
        let keys = self.cf(CF_ORDER_KEYS)?;
        let Some(id) = self.db.get_cf(&keys, Self::index_key(store_id, out_trade_no))? else {
            return Ok(None);
        };
        let orders = self.cf(CF_ORDERS)?;
        match self.db.get_cf(&orders, id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn create_if_absent(&self, order: Order) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let keys = self.cf(CF_ORDER_KEYS)?;
        let orders = self.cf(CF_ORDERS)?;

        let index = Self::index_key(&order.store_id, &order.out_trade_no);
        if self.db.get_pinned_cf(&keys, &index)?.is_some() {
            return Err(StoreError::DuplicateKey {
                store_id: order.store_id,
                out_trade_no: order.out_trade_no,
            });
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&keys, &index, order.id.as_bytes());
        batch.put_cf(&orders, order.id.as_bytes(), serde_json::to_vec(&order)?);
        self.db.write(batch)?;
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let orders = self.cf(CF_ORDERS)?;
        if self.db.get_pinned_cf(&orders, order.id.as_bytes())?.is_none() {
            return Err(StoreError::Missing(order.out_trade_no.clone()));
        }
        self.db
            .put_cf(&orders, order.id.as_bytes(), serde_json::to_vec(order)?)?;
        Ok(())
    }

    async fn sum_open_refunds(&self, link_id: Uuid) -> Result<i64, StoreError> {
        let orders = self.scan()?;
        Ok(refund_total(&orders, link_id, |s| s != OrderStatus::Closed))
    }

    async fn apply_refund(&self, refund: &Order) -> Result<Order, StoreError> {
        let _guard = self.write_lock.lock().await;
        let rows = self.cf(CF_ORDERS)?;
        let missing = || StoreError::Missing(refund.out_trade_no.clone());
        let link_id = refund.link_id.ok_or_else(missing)?;
        if self.db.get_pinned_cf(&rows, refund.id.as_bytes())?.is_none() {
            return Err(missing());
        }
        let mut original: Order = match self.db.get_cf(&rows, link_id.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => return Err(StoreError::Missing(link_id.to_string())),
        };

        let orders = self.scan()?;
        let others = orders.iter().filter(|o| o.id != refund.id);
        let refunded = refund_total(others.chain([refund]), link_id, |s| s == OrderStatus::Success);
        if refunded > original.total_fee {
            return Err(StoreError::RefundExceedsTotal {
                out_trade_no: original.out_trade_no,
                refunded,
                total_fee: original.total_fee,
            });
        }
        if original.refund_fee != refunded {
            original.refund_fee = refunded;
            original.touch();
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&rows, refund.id.as_bytes(), serde_json::to_vec(refund)?);
        batch.put_cf(&rows, original.id.as_bytes(), serde_json::to_vec(&original)?);
        self.db.write(batch)?;
        Ok(original)
    }

    async fn list_by_store(&self, store_id: &str) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .scan()?
            .into_iter()
            .filter(|o| o.store_id == store_id)
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::Channel;
    use crate::domain::fee::FeeRate;
    use crate::domain::order::OrderDraft;
    use tempfile::tempdir;

    fn order(out_trade_no: &str) -> Order {
        OrderDraft {
            store_id: "S1".to_string(),
            out_trade_no: out_trade_no.to_string(),
            channel: Channel::Wechat,
            total_fee: 100,
            title: "T".to_string(),
            auth_code: Some("136514469045151336".to_string()),
            link_id: None,
            operator_id: None,
            terminal_id: None,
            attach: None,
        }
        .into_order()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ORDERS).is_some());
        assert!(store.db.cf_handle(CF_ORDER_KEYS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_unique_key() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderStore::open(dir.path()).unwrap();

        let first = order("O1");
        store.create_if_absent(first.clone()).await.unwrap();
        let err = store.create_if_absent(order("O1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));

        let stored = store
            .get_by_store_and_out_trade_no("S1", "O1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn test_rocksdb_refund_total() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderStore::open(dir.path()).unwrap();

        let mut original = order("O1");
        original.succeed(Some("T1".to_string()), FeeRate::ZERO).unwrap();
        store.create_if_absent(original.clone()).await.unwrap();

        let mut refund = OrderDraft::refund_of(&original, "R1", 40).into_order();
        store.create_if_absent(refund.clone()).await.unwrap();
        assert_eq!(store.sum_open_refunds(original.id).await.unwrap(), 40);

        refund.succeed(None, FeeRate::ZERO).unwrap();
        let updated = store.apply_refund(&refund).await.unwrap();
        assert_eq!(updated.refund_fee, 40);

        let stored = store
            .get_by_store_and_out_trade_no("S1", "O1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refund_fee, 40);
        assert_eq!(store.list_by_store("S1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rocksdb_refund_total_is_bounded() {
        let dir = tempdir().unwrap();
        let store = RocksDBOrderStore::open(dir.path()).unwrap();

        let mut original = order("O1");
        original.succeed(Some("T1".to_string()), FeeRate::ZERO).unwrap();
        store.create_if_absent(original.clone()).await.unwrap();

        let mut r1 = OrderDraft::refund_of(&original, "R1", 70).into_order();
        let mut r2 = OrderDraft::refund_of(&original, "R2", 70).into_order();
        store.create_if_absent(r1.clone()).await.unwrap();
        store.create_if_absent(r2.clone()).await.unwrap();

        r1.succeed(None, FeeRate::ZERO).unwrap();
        store.apply_refund(&r1).await.unwrap();
        r2.succeed(None, FeeRate::ZERO).unwrap();
        let err = store.apply_refund(&r2).await.unwrap_err();
        assert!(matches!(err, StoreError::RefundExceedsTotal { refunded: 140, .. }));

        let stored = store
            .get_by_store_and_out_trade_no("S1", "R2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }
}
