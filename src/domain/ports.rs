use super::channel::{Channel, Credentials, PayContent};
use super::merchant::MerchantConfig;
use super::order::Order;
use super::provider::ProviderReply;
use crate::error::{ChannelError, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Order ledger. `(store_id, out_trade_no)` must be unique at this layer.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_by_store_and_out_trade_no(
        &self,
        store_id: &str,
        out_trade_no: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Inserts `order` unless its key is taken, in which case `StoreError::DuplicateKey`
    /// is returned and nothing is written.
    async fn create_if_absent(&self, order: Order) -> Result<(), StoreError>;

    async fn update(&self, order: &Order) -> Result<(), StoreError>;

    /// Sum of `|total_fee|` over refund orders linked to `link_id` that are not CLOSED.
    /// A PENDING refund may already be moving money at the provider, so it counts.
    async fn sum_open_refunds(&self, link_id: Uuid) -> Result<i64, StoreError>;

    /// Stores `refund` and rewrites its original's `refund_fee` as the sum of every SUCCESS
    /// refund linked to it, in one atomic step. Fails with `StoreError::RefundExceedsTotal`
    /// and writes nothing when that sum would exceed the original's `total_fee`.
    ///
    /// Returns the original as stored.
    async fn apply_refund(&self, refund: &Order) -> Result<Order, StoreError>;

    async fn list_by_store(&self, store_id: &str) -> Result<Vec<Order>, StoreError>;
}

pub type OrderRepositoryBox = Box<dyn OrderRepository>;
pub type ConfigRepositoryBox = Box<dyn ConfigRepository>;
pub type CredentialSourceBox = Box<dyn PlatformCredentialSource>;

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get_by_store_id(&self, store_id: &str) -> Result<Option<MerchantConfig>, StoreError>;
}

/// Process-wide platform credentials used when a merchant is a sub-merchant.
pub trait PlatformCredentialSource: Send + Sync {
    fn get(&self, key: &str, default: &str) -> String;
}

/// One payment rail. Implementations are stateless; credentials arrive with every call
/// and the reply is the provider's own vocabulary, untouched.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn pay(&self, creds: &Credentials, content: &PayContent) -> Result<ProviderReply, ChannelError>;

    async fn query(&self, creds: &Credentials, out_trade_no: &str) -> Result<ProviderReply, ChannelError>;

    async fn refund(
        &self,
        creds: &Credentials,
        refund: &Order,
        original: &Order,
    ) -> Result<ProviderReply, ChannelError>;

    async fn refund_query(
        &self,
        creds: &Credentials,
        out_trade_no: &str,
        out_refund_no: &str,
    ) -> Result<ProviderReply, ChannelError>;

    async fn cancel(&self, creds: &Credentials, out_trade_no: &str) -> Result<ProviderReply, ChannelError>;
}

/// One client per channel, selected by the resolved channel tag.
#[derive(Clone)]
pub struct ChannelSet {
    pub alipay: Arc<dyn ChannelClient>,
    pub wechat: Arc<dyn ChannelClient>,
    pub icbc: Arc<dyn ChannelClient>,
}

impl ChannelSet {
    /// Routes every channel to the same client.
    pub fn shared(client: Arc<dyn ChannelClient>) -> Self {
        Self {
            alipay: client.clone(),
            wechat: client.clone(),
            icbc: client,
        }
    }

    pub fn get(&self, channel: Channel) -> &Arc<dyn ChannelClient> {
        match channel {
            Channel::Alipay => &self.alipay,
            Channel::Wechat => &self.wechat,
            Channel::Icbc => &self.icbc,
        }
    }
}
