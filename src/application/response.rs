//! Request and response shapes exposed by the gateway operations.

use crate::domain::channel::Channel;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::provider::{ProviderReply, TradeDetails};
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayRequest {
    pub store_id: String,
    pub channel: Option<Channel>,
    pub auth_code: String,
    pub title: String,
    pub out_trade_no: String,
    pub total_fee: i64,
    pub operator_id: Option<String>,
    pub terminal_id: Option<String>,
    pub attach: Option<String>,
}

/// Addresses an existing payment order. Used by both Query and Cancel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub store_id: String,
    pub out_trade_no: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub store_id: String,
    pub out_trade_no: String,
    pub out_refund_no: String,
    /// Zero refunds whatever is still refundable.
    pub refund_fee: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundQueryRequest {
    pub store_id: String,
    pub out_trade_no: String,
    pub out_refund_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRequest {
    Pay(PayRequest),
    Query(QueryRequest),
    Cancel(QueryRequest),
    Refund(RefundRequest),
    RefundQuery(RefundQueryRequest),
}

impl GatewayRequest {
    pub fn op(&self) -> &'static str {
        match self {
            GatewayRequest::Pay(_) => "pay",
            GatewayRequest::Query(_) => "query",
            GatewayRequest::Cancel(_) => "cancel",
            GatewayRequest::Refund(_) => "refund",
            GatewayRequest::RefundQuery(_) => "refund_query",
        }
    }

    pub fn store_id(&self) -> &str {
        match self {
            GatewayRequest::Pay(r) => &r.store_id,
            GatewayRequest::Query(r) | GatewayRequest::Cancel(r) => &r.store_id,
            GatewayRequest::Refund(r) => &r.store_id,
            GatewayRequest::RefundQuery(r) => &r.store_id,
        }
    }
}

/// Status reported to the merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Success,
    /// Still waiting on the buyer or the provider; query again later.
    UserPaying,
    Closed,
    /// The provider confirmed but the local ledger could not be updated.
    Waiting,
}

impl From<OrderStatus> for TradeStatus {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Success => TradeStatus::Success,
            OrderStatus::Pending => TradeStatus::UserPaying,
            OrderStatus::Closed => TradeStatus::Closed,
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeStatus::Success => "SUCCESS",
            TradeStatus::UserPaying => "USERPAYING",
            TradeStatus::Closed => "CLOSED",
            TradeStatus::Waiting => "WAITING",
        })
    }
}

/// Answer to Pay, Query and Cancel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeResponse {
    pub status: Option<TradeStatus>,
    pub channel: Option<Channel>,
    pub out_trade_no: String,
    pub trade_no: Option<String>,
    pub total_fee: i64,
    /// Only reported by Query.
    pub refund_fee: Option<i64>,
    pub buyer_id: Option<String>,
    pub paid_at: Option<String>,
    /// The provider's raw reply, when one was received.
    pub content: Option<Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl TradeResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            status: Some(order.status.into()),
            channel: Some(order.channel),
            out_trade_no: order.out_trade_no.clone(),
            trade_no: order.trade_no.clone(),
            total_fee: order.total_fee,
            ..Self::default()
        }
    }

    pub fn with_reply(mut self, reply: &ProviderReply, details: TradeDetails) -> Self {
        self.content = Some(Value::Object(reply.clone()));
        self.buyer_id = details.buyer_id;
        self.paid_at = details.paid_at;
        if self.trade_no.is_none() {
            self.trade_no = details.trade_no;
        }
        self
    }

    /// Folds an error into the response; ledger failures after provider success
    /// are reported as WAITING.
    pub fn with_error(mut self, err: &GatewayError) -> Self {
        if matches!(err, GatewayError::LedgerOutOfSync { .. }) {
            self.status = Some(TradeStatus::Waiting);
        }
        self.error_code = Some(err.code());
        self.error_message = Some(err.to_string());
        self
    }

    pub fn rejected(out_trade_no: &str, err: &GatewayError) -> Self {
        Self {
            out_trade_no: out_trade_no.to_string(),
            ..Self::default()
        }
        .with_error(err)
    }

    pub fn is_ok(&self) -> bool {
        self.error_code.is_none()
    }
}

/// Answer to Refund and RefundQuery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub status: Option<TradeStatus>,
    pub out_trade_no: String,
    pub out_refund_no: String,
    /// Provider number of the original payment.
    pub trade_no: Option<String>,
    /// Amount of the original payment.
    pub total_fee: i64,
    /// Amount of this refund.
    pub refund_fee: i64,
    pub content: Option<Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RefundResponse {
    pub fn from_orders(original: &Order, refund: &Order) -> Self {
        Self {
            status: Some(refund.status.into()),
            out_trade_no: original.out_trade_no.clone(),
            out_refund_no: refund.out_trade_no.clone(),
            trade_no: original.trade_no.clone(),
            total_fee: original.total_fee,
            refund_fee: -refund.total_fee,
            ..Self::default()
        }
    }

    pub fn with_reply(mut self, reply: &ProviderReply) -> Self {
        self.content = Some(Value::Object(reply.clone()));
        self
    }

    pub fn with_error(mut self, err: &GatewayError) -> Self {
        if matches!(err, GatewayError::LedgerOutOfSync { .. }) {
            self.status = Some(TradeStatus::Waiting);
        }
        self.error_code = Some(err.code());
        self.error_message = Some(err.to_string());
        self
    }

    pub fn rejected(out_trade_no: &str, out_refund_no: &str, err: &GatewayError) -> Self {
        Self {
            out_trade_no: out_trade_no.to_string(),
            out_refund_no: out_refund_no.to_string(),
            ..Self::default()
        }
        .with_error(err)
    }

    pub fn is_ok(&self) -> bool {
        self.error_code.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    Trade(TradeResponse),
    Refund(RefundResponse),
}
