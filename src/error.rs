use crate::domain::channel::{Channel, UnknownChannel};
use crate::domain::order::OrderStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Structural precondition failures. These never reach persistence or a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("store id must not be empty")]
    MissingStoreId,
    #[error("auth code must not be empty")]
    MissingAuthCode,
    #[error("title must not be empty")]
    MissingTitle,
    #[error("out trade no must not be empty")]
    MissingOutTradeNo,
    #[error("out refund no must not be empty")]
    MissingOutRefundNo,
    #[error("total fee must be positive, got {0}")]
    NonPositiveTotalFee(i64),
    #[error("refund fee must not be negative, got {0}")]
    NegativeRefundFee(i64),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingStoreId => "Validation.StoreId",
            Self::MissingAuthCode => "Validation.AuthCode",
            Self::MissingTitle => "Validation.Title",
            Self::MissingOutTradeNo => "Validation.OutTradeNo",
            Self::MissingOutRefundNo => "Validation.OutRefundNo",
            Self::NonPositiveTotalFee(_) => "Validation.TotalFee",
            Self::NegativeRefundFee(_) => "Validation.RefundFee",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefundPolicyError {
    #[error("original order is {0}, only paid orders can be refunded")]
    NotPaid(OrderStatus),
    #[error("a refund order cannot itself be refunded")]
    RefundOfRefund,
    #[error("order is already fully refunded")]
    FullyRefunded,
    #[error("refund of {requested} exceeds the refundable amount {refundable}")]
    ExceedsRefundable { requested: i64, refundable: i64 },
}

impl RefundPolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotPaid(_) => "Refund.NotPaid",
            Self::RefundOfRefund => "Refund.OfRefund",
            Self::FullyRefunded => "Refund.FullyRefunded",
            Self::ExceedsRefundable { .. } => "Refund.ExceedsRefundable",
        }
    }
}

/// Failures raised by order/config repositories.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("order {store_id}/{out_trade_no} already exists")]
    DuplicateKey {
        store_id: String,
        out_trade_no: String,
    },
    #[error("order {0} does not exist")]
    Missing(String),
    #[error("refunds of {out_trade_no} would total {refunded}, above the paid {total_fee}")]
    RefundExceedsTotal {
        out_trade_no: String,
        refunded: i64,
        total_fee: i64,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Transport or protocol failure while talking to a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ChannelError(pub String);

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A provider answered, but not in a shape the normalization tables understand.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed {channel} response: {source}")]
    Malformed {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },
    #[error("{channel} response has unrecognised {field} {value:?}")]
    UnknownState {
        channel: Channel,
        field: &'static str,
        value: Option<String>,
    },
}

/// A batch input row that could not be turned into a request.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Channel(#[from] UnknownChannel),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("merchant {0} has no payment configuration")]
    MerchantNotFound(String),
    #[error("payments are disabled for merchant {0}")]
    MerchantDisabled(String),
    #[error("no payment channel could be resolved for this request")]
    ChannelUnresolved,
    #[error("{channel} does not support {operation}")]
    ChannelUnsupported {
        channel: Channel,
        operation: &'static str,
    },
    #[error("request uses {requested} but order {out_trade_no} was placed on {existing}")]
    ChannelMismatch {
        out_trade_no: String,
        requested: Channel,
        existing: Channel,
    },
    #[error("order {0} already exists with different business fields")]
    OrderConflict(String),
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("order {0} is closed")]
    OrderClosed(String),
    #[error("order {0} is a refund order, use the refund query")]
    RefundOrder(String),
    #[error("order {0} is no longer pending")]
    NotPending(String),
    #[error(transparent)]
    RefundPolicy(#[from] RefundPolicyError),
    #[error("{channel} request failed: {source}")]
    ProviderCommunication {
        channel: Channel,
        #[source]
        source: ChannelError,
    },
    #[error("{channel} declined the request: {code} {message}")]
    ProviderBusiness {
        channel: Channel,
        code: String,
        message: String,
    },
    #[error(transparent)]
    UnexpectedResponse(#[from] DecodeError),
    #[error("provider reports {reported} but order {out_trade_no} is stored as {stored}")]
    StatusConflict {
        out_trade_no: String,
        stored: OrderStatus,
        reported: OrderStatus,
    },
    #[error("provider confirmed order {out_trade_no} but the ledger update failed: {source}")]
    LedgerOutOfSync {
        out_trade_no: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Stable dotted code reported to callers alongside the message.
    pub fn code(&self) -> String {
        match self {
            Self::Validation(e) => e.code().to_string(),
            Self::MerchantNotFound(_) => "Config.NotFound".to_string(),
            Self::MerchantDisabled(_) => "Config.Disabled".to_string(),
            Self::ChannelUnresolved => "Config.ChannelUnresolved".to_string(),
            Self::ChannelUnsupported { .. } => "Channel.Unsupported".to_string(),
            Self::ChannelMismatch { .. } => "Order.ChannelMismatch".to_string(),
            Self::OrderConflict(_) => "Order.Conflict".to_string(),
            Self::OrderNotFound(_) => "Order.NotFound".to_string(),
            Self::OrderClosed(_) => "Order.Closed".to_string(),
            Self::RefundOrder(_) => "Order.IsRefund".to_string(),
            Self::NotPending(_) => "Order.NotPending".to_string(),
            Self::RefundPolicy(e) => e.code().to_string(),
            Self::ProviderCommunication { channel, .. } => format!("Provider.{channel}.Error"),
            Self::ProviderBusiness { channel, .. } => format!("Provider.{channel}.Declined"),
            Self::UnexpectedResponse(_) => "Provider.UnexpectedResponse".to_string(),
            Self::StatusConflict { .. } => "Order.StatusConflict".to_string(),
            Self::LedgerOutOfSync { .. } => "Ledger.OutOfSync".to_string(),
            Self::Store(_) => "Store.Failure".to_string(),
        }
    }
}
