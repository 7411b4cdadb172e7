//! An offline payment provider that answers in each channel's native vocabulary.
//!
//! Trades are kept per `(channel, merchant id, out_trade_no)`: payments succeed as soon as
//! the merchant credentials are present, refunds are bounded by what was paid, and
//! cancelling closes the trade for good.

use crate::domain::channel::{Channel, Credentials, PayContent};
use crate::domain::order::Order;
use crate::domain::ports::{ChannelClient, ChannelSet};
use crate::domain::provider::ProviderReply;
use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

const ALIPAY_BUYER: &str = "2088102146225135";
const WECHAT_OPENID: &str = "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o";
const ICBC_BUYER: &str = "icbc_sandbox_buyer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TradeState {
    Paid,
    Closed,
}

#[derive(Debug, Clone)]
struct SandboxTrade {
    trade_no: String,
    total_fee: i64,
    refunded: i64,
    state: TradeState,
}

#[derive(Debug, Clone)]
struct SandboxRefund {
    refund_no: String,
    amount: i64,
}

#[derive(Default)]
struct Ledger {
    trades: HashMap<String, SandboxTrade>,
    refunds: HashMap<String, SandboxRefund>,
}

#[derive(Default)]
pub struct SandboxChannel {
    ledger: Mutex<Ledger>,
    sequence: AtomicU64,
}

impl SandboxChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel set routing every channel to one sandbox.
    pub fn channel_set() -> ChannelSet {
        ChannelSet::shared(Arc::new(Self::new()))
    }

    fn ledger(&self) -> Result<std::sync::MutexGuard<'_, Ledger>, ChannelError> {
        self.ledger
            .lock()
            .map_err(|_| ChannelError::new("sandbox ledger poisoned"))
    }

    fn next_no(&self, channel: Channel) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let day = Utc::now().format("%Y%m%d");
        match channel {
            Channel::Alipay => format!("{day}22001{seq:011}"),
            Channel::Wechat => format!("4200{day}{seq:010}"),
            Channel::Icbc => format!("ICBC{day}{seq:08}"),
        }
    }
}

fn merchant_id(creds: &Credentials) -> &str {
    match creds {
        Credentials::Alipay(c) => &c.app_id,
        Credentials::Wechat(c) => &c.mch_id,
        Credentials::Icbc(c) => &c.mer_id,
    }
}

fn trade_key(creds: &Credentials, out_trade_no: &str) -> String {
    format!("{}:{}:{}", creds.channel(), merchant_id(creds), out_trade_no)
}

fn refund_key(creds: &Credentials, out_trade_no: &str, out_refund_no: &str) -> String {
    format!("{}:{out_refund_no}", trade_key(creds, out_trade_no))
}

fn object(value: Value) -> ProviderReply {
    match value {
        Value::Object(map) => map,
        _ => ProviderReply::new(),
    }
}

fn timestamp(channel: Channel) -> String {
    let format = match channel {
        Channel::Alipay => "%Y-%m-%d %H:%M:%S",
        Channel::Wechat | Channel::Icbc => "%Y%m%d%H%M%S",
    };
    Utc::now().format(format).to_string()
}

fn missing_credentials(channel: Channel) -> ProviderReply {
    object(match channel {
        Channel::Alipay => json!({
            "code": "40001",
            "msg": "Missing Required Arguments",
            "sub_code": "isv.missing-app-id",
            "sub_msg": "app_id is required",
        }),
        Channel::Wechat => json!({
            "return_code": "FAIL",
            "return_msg": "mch_id is required",
        }),
        Channel::Icbc => json!({
            "return_code": 400017,
            "return_msg": "mer_id is required",
        }),
    })
}

fn trade_not_found(channel: Channel) -> ProviderReply {
    object(match channel {
        Channel::Alipay => json!({
            "code": "40004",
            "msg": "Business Failed",
            "sub_code": "ACQ.TRADE_NOT_EXIST",
            "sub_msg": "trade does not exist",
        }),
        Channel::Wechat => json!({
            "return_code": "SUCCESS",
            "result_code": "FAIL",
            "err_code": "ORDERNOTEXIST",
            "err_code_des": "order does not exist",
        }),
        Channel::Icbc => json!({
            "return_code": 400011,
            "return_msg": "order does not exist",
        }),
    })
}

fn trade_closed(channel: Channel) -> ProviderReply {
    object(match channel {
        Channel::Alipay => json!({
            "code": "40004",
            "msg": "Business Failed",
            "sub_code": "ACQ.TRADE_HAS_CLOSE",
            "sub_msg": "trade is closed",
        }),
        Channel::Wechat => json!({
            "return_code": "SUCCESS",
            "result_code": "FAIL",
            "err_code": "ORDERCLOSED",
            "err_code_des": "order is closed",
        }),
        Channel::Icbc => json!({
            "return_code": 400021,
            "return_msg": "order is closed",
        }),
    })
}

#[async_trait]
impl ChannelClient for SandboxChannel {
    async fn pay(&self, creds: &Credentials, content: &PayContent) -> Result<ProviderReply, ChannelError> {
        let channel = creds.channel();
        debug!(%channel, sandbox = creds.sandbox(), out_trade_no = %content.out_trade_no, "sandbox pay");
        if merchant_id(creds).is_empty() {
            return Ok(missing_credentials(channel));
        }

        let trade_no = self.next_no(channel);
        let mut ledger = self.ledger()?;
        let trade = ledger
            .trades
            .entry(trade_key(creds, &content.out_trade_no))
            .or_insert_with(|| SandboxTrade {
                trade_no,
                total_fee: content.total_fee,
                refunded: 0,
                state: TradeState::Paid,
            });
        if trade.state == TradeState::Closed {
            return Ok(trade_closed(channel));
        }

        Ok(object(match channel {
            Channel::Alipay => json!({
                "code": "10000",
                "msg": "Success",
                "trade_no": trade.trade_no,
                "out_trade_no": content.out_trade_no,
                "buyer_user_id": ALIPAY_BUYER,
                "buyer_logon_id": "sandbox***@example.com",
                "total_amount": content.amount.to_string(),
                "gmt_payment": timestamp(channel),
            }),
            Channel::Wechat => json!({
                "return_code": "SUCCESS",
                "return_msg": "OK",
                "result_code": "SUCCESS",
                "transaction_id": trade.trade_no,
                "out_trade_no": content.out_trade_no,
                "openid": WECHAT_OPENID,
                "total_fee": content.total_fee,
                "time_end": timestamp(channel),
            }),
            Channel::Icbc => json!({
                "return_code": 0,
                "return_msg": "success",
                "pay_status": "1",
                "order_id": trade.trade_no,
                "out_trade_no": content.out_trade_no,
                "total_amt": content.total_fee.to_string(),
                "third_party_user_id": ICBC_BUYER,
                "pay_time": timestamp(channel),
            }),
        }))
    }

    async fn query(&self, creds: &Credentials, out_trade_no: &str) -> Result<ProviderReply, ChannelError> {
        let channel = creds.channel();
        debug!(%channel, out_trade_no, "sandbox query");
        if merchant_id(creds).is_empty() {
            return Ok(missing_credentials(channel));
        }

        let ledger = self.ledger()?;
        let Some(trade) = ledger.trades.get(&trade_key(creds, out_trade_no)) else {
            return Ok(trade_not_found(channel));
        };
        let fully_refunded = trade.refunded >= trade.total_fee;

        Ok(object(match channel {
            Channel::Alipay => {
                let status = match trade.state {
                    TradeState::Paid if fully_refunded => "TRADE_CLOSED",
                    TradeState::Paid => "TRADE_SUCCESS",
                    TradeState::Closed => "TRADE_CLOSED",
                };
                json!({
                    "code": "10000",
                    "msg": "Success",
                    "trade_no": trade.trade_no,
                    "out_trade_no": out_trade_no,
                    "trade_status": status,
                    "buyer_user_id": ALIPAY_BUYER,
                })
            }
            Channel::Wechat => {
                let state = match trade.state {
                    TradeState::Paid if trade.refunded > 0 => "REFUND",
                    TradeState::Paid => "SUCCESS",
                    TradeState::Closed => "CLOSED",
                };
                json!({
                    "return_code": "SUCCESS",
                    "result_code": "SUCCESS",
                    "transaction_id": trade.trade_no,
                    "out_trade_no": out_trade_no,
                    "trade_state": state,
                    "openid": WECHAT_OPENID,
                })
            }
            Channel::Icbc => {
                let status = match trade.state {
                    TradeState::Paid if fully_refunded => "5",
                    TradeState::Paid if trade.refunded > 0 => "6",
                    TradeState::Paid => "1",
                    TradeState::Closed => "3",
                };
                json!({
                    "return_code": "0",
                    "return_msg": "success",
                    "pay_status": status,
                    "order_id": trade.trade_no,
                    "out_trade_no": out_trade_no,
                })
            }
        }))
    }

    async fn refund(
        &self,
        creds: &Credentials,
        refund: &Order,
        original: &Order,
    ) -> Result<ProviderReply, ChannelError> {
        let channel = creds.channel();
        debug!(%channel, out_trade_no = %original.out_trade_no, out_refund_no = %refund.out_trade_no, "sandbox refund");
        if merchant_id(creds).is_empty() {
            return Ok(missing_credentials(channel));
        }

        let amount = refund.total_fee.abs();
        let refund_no = self.next_no(channel);
        let mut guard = self.ledger()?;
        let ledger = &mut *guard;
        let Some(trade) = ledger.trades.get_mut(&trade_key(creds, &original.out_trade_no)) else {
            return Ok(trade_not_found(channel));
        };
        if trade.state == TradeState::Closed {
            return Ok(trade_closed(channel));
        }

        let key = refund_key(creds, &original.out_trade_no, &refund.out_trade_no);
        if !ledger.refunds.contains_key(&key) {
            if trade.refunded + amount > trade.total_fee {
                return Ok(object(match channel {
                    Channel::Alipay => json!({
                        "code": "40004",
                        "msg": "Business Failed",
                        "sub_code": "ACQ.REFUND_AMT_NOT_EQUAL_TOTAL",
                        "sub_msg": "refund amount exceeds the trade amount",
                    }),
                    Channel::Wechat => json!({
                        "return_code": "SUCCESS",
                        "result_code": "FAIL",
                        "err_code": "INVALID_REQUEST",
                        "err_code_des": "refund amount exceeds the trade amount",
                    }),
                    Channel::Icbc => json!({
                        "return_code": 400031,
                        "return_msg": "refund amount exceeds the trade amount",
                    }),
                }));
            }
            trade.refunded += amount;
            ledger.refunds.insert(key.clone(), SandboxRefund { refund_no, amount });
        }
        let recorded = ledger.refunds.get(&key).cloned().ok_or_else(|| ChannelError::new("refund not recorded"))?;

        Ok(object(match channel {
            Channel::Alipay => json!({
                "code": "10000",
                "msg": "Success",
                "trade_no": trade.trade_no,
                "out_trade_no": original.out_trade_no,
                "fund_change": "Y",
                "refund_fee": channel.provider_amount(recorded.amount).to_string(),
                "gmt_refund_pay": timestamp(channel),
            }),
            Channel::Wechat => json!({
                "return_code": "SUCCESS",
                "result_code": "SUCCESS",
                "transaction_id": trade.trade_no,
                "out_trade_no": original.out_trade_no,
                "out_refund_no": refund.out_trade_no,
                "refund_id": recorded.refund_no,
                "refund_fee": recorded.amount,
            }),
            Channel::Icbc => json!({
                "return_code": 0,
                "return_msg": "success",
                "order_id": trade.trade_no,
                "reject_no": recorded.refund_no,
                "reject_amt": recorded.amount.to_string(),
            }),
        }))
    }

    async fn refund_query(
        &self,
        creds: &Credentials,
        out_trade_no: &str,
        out_refund_no: &str,
    ) -> Result<ProviderReply, ChannelError> {
        let channel = creds.channel();
        debug!(%channel, out_trade_no, out_refund_no, "sandbox refund query");
        if merchant_id(creds).is_empty() {
            return Ok(missing_credentials(channel));
        }

        let ledger = self.ledger()?;
        let recorded = ledger.refunds.get(&refund_key(creds, out_trade_no, out_refund_no));

        Ok(object(match (channel, recorded) {
            (Channel::Alipay, Some(r)) => json!({
                "code": "10000",
                "msg": "Success",
                "out_trade_no": out_trade_no,
                "out_request_no": out_refund_no,
                "refund_status": "REFUND_SUCCESS",
                "refund_amount": channel.provider_amount(r.amount).to_string(),
            }),
            (Channel::Alipay, None) => json!({
                "code": "10000",
                "msg": "Success",
                "out_trade_no": out_trade_no,
            }),
            (Channel::Wechat, Some(r)) => json!({
                "return_code": "SUCCESS",
                "result_code": "SUCCESS",
                "out_trade_no": out_trade_no,
                "refund_status_0": "SUCCESS",
                "refund_id_0": r.refund_no,
                "refund_fee_0": r.amount,
            }),
            (Channel::Wechat, None) => json!({
                "return_code": "SUCCESS",
                "result_code": "FAIL",
                "err_code": "REFUNDNOTEXIST",
                "err_code_des": "refund does not exist",
            }),
            (Channel::Icbc, Some(r)) => json!({
                "return_code": 0,
                "return_msg": "success",
                "reject_no": r.refund_no,
                "reject_amt": r.amount.to_string(),
            }),
            (Channel::Icbc, None) => json!({
                "return_code": 0,
                "return_msg": "success",
            }),
        }))
    }

    async fn cancel(&self, creds: &Credentials, out_trade_no: &str) -> Result<ProviderReply, ChannelError> {
        let channel = creds.channel();
        debug!(%channel, out_trade_no, "sandbox cancel");
        if channel == Channel::Icbc {
            return Err(ChannelError::new("icbc offers no cancel interface"));
        }
        if merchant_id(creds).is_empty() {
            return Ok(missing_credentials(channel));
        }

        let trade_no = self.next_no(channel);
        let mut ledger = self.ledger()?;
        let trade = ledger
            .trades
            .entry(trade_key(creds, out_trade_no))
            .or_insert_with(|| SandboxTrade {
                trade_no,
                total_fee: 0,
                refunded: 0,
                state: TradeState::Closed,
            });
        let action = match trade.state {
            TradeState::Paid => "refund",
            TradeState::Closed => "close",
        };
        trade.refunded = trade.total_fee;
        trade.state = TradeState::Closed;

        Ok(object(match channel {
            Channel::Wechat => json!({
                "return_code": "SUCCESS",
                "result_code": "SUCCESS",
                "recall": "N",
            }),
            _ => json!({
                "code": "10000",
                "msg": "Success",
                "trade_no": trade.trade_no,
                "out_trade_no": out_trade_no,
                "retry_flag": "N",
                "action": action,
            }),
        }))
    }
}
