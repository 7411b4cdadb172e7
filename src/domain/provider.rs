//! Provider responses decoded into one typed result per channel, and the tables that
//! map each provider's vocabulary onto the canonical order outcome.

use crate::domain::channel::Channel;
use crate::error::DecodeError;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The untyped, string-keyed map a channel client hands back.
pub type ProviderReply = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pay,
    Query,
    Refund,
    RefundQuery,
    Cancel,
}

/// Canonical reading of a provider answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Pending,
    Closed,
    Declined,
}

/// Provider-side details worth surfacing to the merchant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeDetails {
    pub trade_no: Option<String>,
    pub buyer_id: Option<String>,
    pub paid_at: Option<String>,
}

const ALIPAY_OK: &str = "10000";
const ALIPAY_USER_PAYING: &str = "10003";
const WECHAT_OK: &str = "SUCCESS";
const ICBC_OK: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlipayResult {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub sub_code: Option<String>,
    pub sub_msg: Option<String>,
    pub trade_no: Option<String>,
    pub out_trade_no: Option<String>,
    pub trade_status: Option<String>,
    pub buyer_user_id: Option<String>,
    pub buyer_logon_id: Option<String>,
    pub gmt_payment: Option<String>,
    pub fund_change: Option<String>,
    pub refund_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WechatResult {
    pub return_code: String,
    pub return_msg: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub trade_state: Option<String>,
    pub openid: Option<String>,
    pub time_end: Option<String>,
    pub refund_id: Option<String>,
    #[serde(rename = "refund_status_0")]
    pub refund_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcbcResult {
    #[serde(deserialize_with = "required_lenient_string")]
    pub return_code: String,
    pub return_msg: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pay_status: Option<String>,
    /// ICBC's own transaction number.
    pub order_id: Option<String>,
    pub out_trade_no: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_amt: Option<String>,
    pub reject_no: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reject_amt: Option<String>,
    pub pay_time: Option<String>,
    pub third_party_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    Alipay(AlipayResult),
    Wechat(WechatResult),
    Icbc(IcbcResult),
}

impl ProviderResponse {
    pub fn decode(channel: Channel, raw: &ProviderReply) -> Result<Self, DecodeError> {
        let value = Value::Object(raw.clone());
        let malformed = |source| DecodeError::Malformed { channel, source };
        Ok(match channel {
            Channel::Alipay => {
                ProviderResponse::Alipay(serde_json::from_value(value).map_err(malformed)?)
            }
            Channel::Wechat => {
                ProviderResponse::Wechat(serde_json::from_value(value).map_err(malformed)?)
            }
            Channel::Icbc => {
                ProviderResponse::Icbc(serde_json::from_value(value).map_err(malformed)?)
            }
        })
    }

    pub fn channel(&self) -> Channel {
        match self {
            ProviderResponse::Alipay(_) => Channel::Alipay,
            ProviderResponse::Wechat(_) => Channel::Wechat,
            ProviderResponse::Icbc(_) => Channel::Icbc,
        }
    }

    pub fn outcome(&self, op: Operation) -> Result<Outcome, DecodeError> {
        match self {
            ProviderResponse::Alipay(r) => r.outcome(op),
            ProviderResponse::Wechat(r) => r.outcome(op),
            ProviderResponse::Icbc(r) => r.outcome(op),
        }
    }

    pub fn details(&self) -> TradeDetails {
        match self {
            ProviderResponse::Alipay(r) => TradeDetails {
                trade_no: r.trade_no.clone(),
                buyer_id: r.buyer_user_id.clone().or_else(|| r.buyer_logon_id.clone()),
                paid_at: r.gmt_payment.clone(),
            },
            ProviderResponse::Wechat(r) => TradeDetails {
                trade_no: r.transaction_id.clone(),
                buyer_id: r.openid.clone(),
                paid_at: r.time_end.clone(),
            },
            ProviderResponse::Icbc(r) => TradeDetails {
                trade_no: r.order_id.clone(),
                buyer_id: r.third_party_user_id.clone(),
                paid_at: r.pay_time.clone(),
            },
        }
    }

    /// The provider's own error code and message, most specific first.
    pub fn reason(&self) -> (String, String) {
        match self {
            ProviderResponse::Alipay(r) => (
                r.sub_code.clone().unwrap_or_else(|| r.code.clone()),
                r.sub_msg.clone().unwrap_or_else(|| r.msg.clone()),
            ),
            ProviderResponse::Wechat(r) => match (&r.err_code, &r.err_code_des) {
                (Some(code), des) => (code.clone(), des.clone().unwrap_or_default()),
                (None, _) => (
                    r.result_code.clone().unwrap_or_else(|| r.return_code.clone()),
                    r.return_msg.clone().unwrap_or_default(),
                ),
            },
            ProviderResponse::Icbc(r) => (r.return_code.clone(), r.return_msg.clone().unwrap_or_default()),
        }
    }
}

impl AlipayResult {
    fn outcome(&self, op: Operation) -> Result<Outcome, DecodeError> {
        let closed_reason = matches!(
            self.sub_code.as_deref(),
            Some("ACQ.TRADE_NOT_EXIST") | Some("ACQ.TRADE_HAS_CLOSE")
        );
        if self.code != ALIPAY_OK {
            return Ok(match op {
                Operation::Pay if self.code == ALIPAY_USER_PAYING => Outcome::Pending,
                Operation::Query | Operation::Refund | Operation::RefundQuery if closed_reason => {
                    Outcome::Closed
                }
                _ => Outcome::Declined,
            });
        }
        match op {
            Operation::Pay if self.msg == "Success" => Ok(Outcome::Success),
            Operation::Pay => Ok(Outcome::Declined),
            Operation::Query => match self.trade_status.as_deref() {
                Some("TRADE_SUCCESS") | Some("TRADE_FINISHED") => Ok(Outcome::Success),
                Some("WAIT_BUYER_PAY") => Ok(Outcome::Pending),
                Some("TRADE_CLOSED") => Ok(Outcome::Closed),
                other => Err(DecodeError::UnknownState {
                    channel: Channel::Alipay,
                    field: "trade_status",
                    value: other.map(str::to_string),
                }),
            },
            Operation::Refund if self.fund_change.as_deref() == Some("Y") || self.msg == "Success" => {
                Ok(Outcome::Success)
            }
            Operation::Refund => Ok(Outcome::Declined),
            Operation::Cancel => Ok(Outcome::Success),
            Operation::RefundQuery => match self.refund_status.as_deref() {
                Some("REFUND_SUCCESS") => Ok(Outcome::Success),
                None => Ok(Outcome::Pending),
                Some(other) => Err(DecodeError::UnknownState {
                    channel: Channel::Alipay,
                    field: "refund_status",
                    value: Some(other.to_string()),
                }),
            },
        }
    }
}

impl WechatResult {
    fn outcome(&self, op: Operation) -> Result<Outcome, DecodeError> {
        if self.return_code != WECHAT_OK {
            return Ok(Outcome::Declined);
        }
        if self.result_code.as_deref() != Some(WECHAT_OK) {
            let err_code = self.err_code.as_deref().unwrap_or_default();
            return Ok(match (op, err_code) {
                (Operation::Pay, "USERPAYING" | "SYSTEMERROR" | "BANKERROR") => Outcome::Pending,
                (Operation::Query, "ORDERNOTEXIST") => Outcome::Closed,
                (Operation::RefundQuery, "REFUNDNOTEXIST") => Outcome::Closed,
                _ => Outcome::Declined,
            });
        }
        match op {
            Operation::Pay | Operation::Refund | Operation::Cancel => Ok(Outcome::Success),
            Operation::Query => match self.trade_state.as_deref() {
                Some("SUCCESS") => Ok(Outcome::Success),
                Some("NOTPAY") | Some("USERPAYING") => Ok(Outcome::Pending),
                Some("REFUND") | Some("CLOSED") | Some("REVOKED") | Some("PAYERROR") => {
                    Ok(Outcome::Closed)
                }
                other => Err(DecodeError::UnknownState {
                    channel: Channel::Wechat,
                    field: "trade_state",
                    value: other.map(str::to_string),
                }),
            },
            Operation::RefundQuery => match self.refund_status.as_deref() {
                Some("SUCCESS") => Ok(Outcome::Success),
                Some("PROCESSING") => Ok(Outcome::Pending),
                Some("REFUNDCLOSE") | Some("CHANGE") => Ok(Outcome::Closed),
                other => Err(DecodeError::UnknownState {
                    channel: Channel::Wechat,
                    field: "refund_status_0",
                    value: other.map(str::to_string),
                }),
            },
        }
    }
}

impl IcbcResult {
    fn outcome(&self, op: Operation) -> Result<Outcome, DecodeError> {
        if self.return_code != ICBC_OK {
            return Ok(Outcome::Declined);
        }
        match op {
            // 0 paying, 1 paid, 2 failed, 3 revoked, 4 revoking, 5 fully refunded,
            // 6 partially refunded, 7 refunding
            Operation::Pay | Operation::Query => match self.pay_status.as_deref() {
                Some("1") | Some("6") | Some("7") => Ok(Outcome::Success),
                Some("0") | Some("4") => Ok(Outcome::Pending),
                Some("-1") | Some("2") | Some("3") | Some("5") => Ok(Outcome::Closed),
                other => Err(DecodeError::UnknownState {
                    channel: Channel::Icbc,
                    field: "pay_status",
                    value: other.map(str::to_string),
                }),
            },
            Operation::Refund | Operation::Cancel => Ok(Outcome::Success),
            Operation::RefundQuery => match self.reject_amt.as_deref() {
                Some(amt) if !amt.is_empty() => Ok(Outcome::Success),
                _ => Ok(Outcome::Pending),
            },
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

fn required_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer)?.ok_or_else(|| de::Error::custom("value must not be null"))
}
