#![allow(dead_code)]

use async_trait::async_trait;
use paygate::application::engine::TradeEngine;
use paygate::application::resolver::ConfigResolver;
use paygate::application::response::PayRequest;
use paygate::domain::channel::{Credentials, PayContent};
use paygate::domain::fee::FeeRate;
use paygate::domain::merchant::MerchantConfig;
use paygate::domain::order::Order;
use paygate::domain::ports::{ChannelClient, ChannelSet, OrderRepository};
use paygate::domain::provider::ProviderReply;
use paygate::error::{ChannelError, StoreError};
use paygate::infrastructure::env::StaticCredentialSource;
use paygate::infrastructure::in_memory::{InMemoryConfigStore, InMemoryOrderStore};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const ALIPAY_CODE: &str = "286203470917515029";
pub const WECHAT_CODE: &str = "136514469045151336";

enum Step {
    Reply(ProviderReply),
    Fail(String),
}

/// A channel client that replays queued provider replies and records every call.
#[derive(Default)]
pub struct ScriptedChannel {
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<ProviderReply>>,
    calls: Mutex<Vec<&'static str>>,
}

fn object(value: Value) -> ProviderReply {
    match value {
        Value::Object(map) => map,
        other => panic!("scripted reply must be an object, got {other}"),
    }
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, value: Value) {
        self.script.lock().unwrap().push_back(Step::Reply(object(value)));
    }

    pub fn fail(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Fail(message.to_string()));
    }

    /// Reply used once the queue is empty.
    pub fn always(&self, value: Value) {
        *self.fallback.lock().unwrap() = Some(object(value));
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_of(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn next(&self, op: &'static str) -> Result<ProviderReply, ChannelError> {
        self.calls.lock().unwrap().push(op);
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(message)) => Err(ChannelError::new(message)),
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ChannelError::new(format!("no scripted reply for {op}"))),
        }
    }
}

#[async_trait]
impl ChannelClient for ScriptedChannel {
    async fn pay(&self, _: &Credentials, _: &PayContent) -> Result<ProviderReply, ChannelError> {
        self.next("pay")
    }

    async fn query(&self, _: &Credentials, _: &str) -> Result<ProviderReply, ChannelError> {
        self.next("query")
    }

    async fn refund(&self, _: &Credentials, _: &Order, _: &Order) -> Result<ProviderReply, ChannelError> {
        self.next("refund")
    }

    async fn refund_query(&self, _: &Credentials, _: &str, _: &str) -> Result<ProviderReply, ChannelError> {
        self.next("refund_query")
    }

    async fn cancel(&self, _: &Credentials, _: &str) -> Result<ProviderReply, ChannelError> {
        self.next("cancel")
    }
}

/// Wraps an order store to count writes, fail updates on demand, or hide rows from the
/// first lookups to simulate a lost creation race.
#[derive(Clone)]
pub struct InstrumentedStore {
    pub inner: InMemoryOrderStore,
    fail_updates: Arc<AtomicBool>,
    updates: Arc<AtomicUsize>,
    hidden_lookups: Arc<AtomicUsize>,
}

impl InstrumentedStore {
    pub fn new(inner: InMemoryOrderStore) -> Self {
        Self {
            inner,
            fail_updates: Arc::new(AtomicBool::new(false)),
            updates: Arc::new(AtomicUsize::new(0)),
            hidden_lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn hide_next_lookups(&self, n: usize) {
        self.hidden_lookups.store(n, Ordering::SeqCst);
    }

    fn write_allowed(&self) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk unavailable".to_string()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InstrumentedStore {
    async fn get_by_store_and_out_trade_no(
        &self,
        store_id: &str,
        out_trade_no: &str,
    ) -> Result<Option<Order>, StoreError> {
        let hidden = self
            .hidden_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden {
            return Ok(None);
        }
        self.inner
            .get_by_store_and_out_trade_no(store_id, out_trade_no)
            .await
    }

    async fn create_if_absent(&self, order: Order) -> Result<(), StoreError> {
        self.inner.create_if_absent(order).await
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        self.write_allowed()?;
        self.inner.update(order).await
    }

    async fn sum_open_refunds(&self, link_id: Uuid) -> Result<i64, StoreError> {
        self.inner.sum_open_refunds(link_id).await
    }

    async fn apply_refund(&self, refund: &Order) -> Result<Order, StoreError> {
        self.write_allowed()?;
        self.inner.apply_refund(refund).await
    }

    async fn list_by_store(&self, store_id: &str) -> Result<Vec<Order>, StoreError> {
        self.inner.list_by_store(store_id).await
    }
}

pub fn merchant(store_id: &str) -> MerchantConfig {
    let mut config = MerchantConfig::new(store_id);
    config.alipay.app_id = "A1".to_string();
    config.alipay.fee = FeeRate::from_basis_points(38);
    config.wechat.mch_id = "M1".to_string();
    config.wechat.fee = FeeRate::from_basis_points(60);
    config.icbc.mer_id = "I1".to_string();
    config.icbc.fee = FeeRate::from_basis_points(25);
    config
}

pub struct Harness {
    pub engine: Arc<TradeEngine>,
    pub store: InstrumentedStore,
    pub channel: Arc<ScriptedChannel>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_merchants(vec![merchant("S1")])
    }

    pub fn with_merchants(merchants: Vec<MerchantConfig>) -> Self {
        let store = InstrumentedStore::new(InMemoryOrderStore::new());
        let channel = ScriptedChannel::new();
        let resolver = ConfigResolver::new(
            Box::new(InMemoryConfigStore::from_configs(merchants)),
            Box::new(StaticCredentialSource::new()),
        );
        let engine = TradeEngine::new(
            Box::new(store.clone()),
            resolver,
            ChannelSet::shared(channel.clone()),
        );
        Self {
            engine: Arc::new(engine),
            store,
            channel,
        }
    }

    pub async fn order(&self, out_trade_no: &str) -> Order {
        self.store
            .inner
            .get_by_store_and_out_trade_no("S1", out_trade_no)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("order {out_trade_no} not stored"))
    }

    pub async fn rows(&self) -> Vec<Order> {
        self.store.inner.list_by_store("S1").await.unwrap()
    }
}

pub fn pay_request(out_trade_no: &str, total_fee: i64) -> PayRequest {
    PayRequest {
        store_id: "S1".to_string(),
        auth_code: ALIPAY_CODE.to_string(),
        title: "T".to_string(),
        out_trade_no: out_trade_no.to_string(),
        total_fee,
        ..PayRequest::default()
    }
}

pub fn alipay_paid(trade_no: &str) -> Value {
    json!({
        "code": "10000",
        "msg": "Success",
        "trade_no": trade_no,
        "buyer_user_id": "2088102146225135",
        "gmt_payment": "2024-05-01 12:00:00",
    })
}

pub fn alipay_paying() -> Value {
    json!({"code": "10003", "msg": "waiting for buyer"})
}

pub fn alipay_trade(status: &str) -> Value {
    json!({"code": "10000", "msg": "Success", "trade_no": "2024T1", "trade_status": status})
}

pub fn alipay_refunded() -> Value {
    json!({"code": "10000", "msg": "Success", "trade_no": "2024T1", "fund_change": "Y"})
}
