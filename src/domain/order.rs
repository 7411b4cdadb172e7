use crate::domain::channel::Channel;
use crate::domain::fee::FeeRate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of an order row. SUCCESS and CLOSED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum OrderStatus {
    Closed,
    Pending,
    Success,
}

impl OrderStatus {
    pub fn code(self) -> i8 {
        match self {
            OrderStatus::Closed => -1,
            OrderStatus::Pending => 0,
            OrderStatus::Success => 1,
        }
    }
}

impl From<OrderStatus> for i8 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i8> for OrderStatus {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(OrderStatus::Closed),
            0 => Ok(OrderStatus::Pending),
            1 => Ok(OrderStatus::Success),
            other => Err(format!("invalid order status {other}")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Success => "SUCCESS",
        })
    }
}

/// One payment or refund. A refund carries a negative `total_fee` and a `link_id`
/// pointing at the original payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub store_id: String,
    pub out_trade_no: String,
    pub trade_no: Option<String>,
    pub total_fee: i64,
    pub fee: i64,
    /// Sum of successful refunds linked to this order.
    pub refund_fee: i64,
    pub channel: Channel,
    pub auth_code: Option<String>,
    pub link_id: Option<Uuid>,
    pub status: OrderStatus,
    pub operator_id: Option<String>,
    pub terminal_id: Option<String>,
    pub title: String,
    pub attach: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_refund(&self) -> bool {
        self.total_fee < 0
    }

    /// PENDING -> SUCCESS, stamping the provider number and the fee.
    ///
    /// Returns `Ok(false)` when the order is already SUCCESS; the stored fee is kept so a
    /// repeated confirmation never charges twice. `Err` carries the conflicting status.
    pub fn succeed(&mut self, trade_no: Option<String>, rate: FeeRate) -> Result<bool, OrderStatus> {
        match self.status {
            OrderStatus::Success => Ok(false),
            OrderStatus::Closed => Err(OrderStatus::Closed),
            OrderStatus::Pending => {
                if trade_no.is_some() {
                    self.trade_no = trade_no;
                }
                self.status = OrderStatus::Success;
                self.fee = rate.fee_for(self.total_fee);
                self.touch();
                Ok(true)
            }
        }
    }

    /// PENDING -> CLOSED. A closed order carries no fee.
    pub fn close(&mut self) -> Result<bool, OrderStatus> {
        match self.status {
            OrderStatus::Closed => Ok(false),
            OrderStatus::Success => Err(OrderStatus::Success),
            OrderStatus::Pending => {
                self.status = OrderStatus::Closed;
                self.fee = 0;
                self.touch();
                Ok(true)
            }
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Business fields for an order that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub store_id: String,
    pub out_trade_no: String,
    pub channel: Channel,
    pub total_fee: i64,
    pub title: String,
    pub auth_code: Option<String>,
    pub link_id: Option<Uuid>,
    pub operator_id: Option<String>,
    pub terminal_id: Option<String>,
    pub attach: Option<String>,
}

impl OrderDraft {
    /// A refund row for `amount` against `original`.
    pub fn refund_of(original: &Order, out_refund_no: &str, amount: i64) -> Self {
        Self {
            store_id: original.store_id.clone(),
            out_trade_no: out_refund_no.to_string(),
            channel: original.channel,
            total_fee: -amount,
            title: original.title.clone(),
            auth_code: None,
            link_id: Some(original.id),
            operator_id: original.operator_id.clone(),
            terminal_id: original.terminal_id.clone(),
            attach: original.attach.clone(),
        }
    }

    pub fn into_order(self) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            store_id: self.store_id,
            out_trade_no: self.out_trade_no,
            trade_no: None,
            total_fee: self.total_fee,
            fee: 0,
            refund_fee: 0,
            channel: self.channel,
            auth_code: self.auth_code,
            link_id: self.link_id,
            status: OrderStatus::Pending,
            operator_id: self.operator_id,
            terminal_id: self.terminal_id,
            title: self.title,
            attach: self.attach,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sum of `|total_fee|` over the refunds of `link_id` whose status passes `counted`.
pub fn refund_total<'a>(
    orders: impl IntoIterator<Item = &'a Order>,
    link_id: Uuid,
    counted: impl Fn(OrderStatus) -> bool,
) -> i64 {
    orders
        .into_iter()
        .filter(|o| o.link_id == Some(link_id) && counted(o.status))
        .map(|o| o.total_fee.abs())
        .sum()
}
