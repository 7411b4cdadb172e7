use crate::domain::fee::FeeRate;
use crate::domain::merchant::{AlipayConfig, IcbcConfig, WechatConfig};
use crate::domain::order::Order;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static ALIPAY_AUTH_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:2[5-9]|30)\d{14,18}$").expect("valid alipay pattern"));
static WECHAT_AUTH_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1[0-5]\d{16}$").expect("valid wechat pattern"));

/// How long the buyer has to confirm a payment-code transaction.
pub const PAY_TIMEOUT: Duration = Duration::from_secs(120);

/// The payment rails this gateway can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Alipay,
    Wechat,
    Icbc,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown payment channel {0:?}")]
pub struct UnknownChannel(pub String);

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Alipay => "alipay",
            Channel::Wechat => "wechat",
            Channel::Icbc => "icbc",
        }
    }

    /// The two built-in wallets are never honoured as a merchant's default channel.
    pub fn is_wallet(self) -> bool {
        matches!(self, Channel::Alipay | Channel::Wechat)
    }

    pub fn supports_cancel(self) -> bool {
        !matches!(self, Channel::Icbc)
    }

    /// Infers the wallet from the shape of a scanned payment code.
    pub fn detect(auth_code: &str) -> Option<Channel> {
        if ALIPAY_AUTH_CODE.is_match(auth_code) {
            Some(Channel::Alipay)
        } else if WECHAT_AUTH_CODE.is_match(auth_code) {
            Some(Channel::Wechat)
        } else {
            None
        }
    }

    /// Converts minor currency units into the unit this provider expects on the wire.
    pub fn provider_amount(self, minor_units: i64) -> ProviderAmount {
        match self {
            Channel::Alipay => ProviderAmount::Major(Decimal::new(minor_units, 2)),
            Channel::Wechat | Channel::Icbc => ProviderAmount::Minor(minor_units),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alipay" => Ok(Channel::Alipay),
            "wechat" => Ok(Channel::Wechat),
            "icbc" => Ok(Channel::Icbc),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}

/// An amount in the provider's own unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderAmount {
    /// Decimal major units, e.g. `1.00` for 100 minor units.
    Major(Decimal),
    /// Integer minor units.
    Minor(i64),
}

impl fmt::Display for ProviderAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderAmount::Major(d) => write!(f, "{d}"),
            ProviderAmount::Minor(m) => write!(f, "{m}"),
        }
    }
}

/// Effective credentials for one call, already resolved against platform overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Alipay(AlipayConfig),
    Wechat(WechatConfig),
    Icbc(IcbcConfig),
}

impl Credentials {
    pub fn channel(&self) -> Channel {
        match self {
            Credentials::Alipay(_) => Channel::Alipay,
            Credentials::Wechat(_) => Channel::Wechat,
            Credentials::Icbc(_) => Channel::Icbc,
        }
    }

    pub fn fee_rate(&self) -> FeeRate {
        match self {
            Credentials::Alipay(c) => c.fee,
            Credentials::Wechat(c) => c.fee,
            Credentials::Icbc(c) => c.fee,
        }
    }

    pub fn sandbox(&self) -> bool {
        match self {
            Credentials::Alipay(c) => c.sandbox,
            Credentials::Wechat(c) => c.sandbox,
            Credentials::Icbc(c) => c.sandbox,
        }
    }
}

/// Business payload for a merchant-scans-buyer payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayContent {
    pub title: String,
    pub auth_code: String,
    pub out_trade_no: String,
    pub total_fee: i64,
    pub amount: ProviderAmount,
    #[serde(skip)]
    pub timeout: Duration,
    pub attach: Option<String>,
}

impl PayContent {
    pub fn for_order(order: &Order) -> Self {
        Self {
            title: order.title.clone(),
            auth_code: order.auth_code.clone().unwrap_or_default(),
            out_trade_no: order.out_trade_no.clone(),
            total_fee: order.total_fee,
            amount: order.channel.provider_amount(order.total_fee),
            timeout: PAY_TIMEOUT,
            attach: order.attach.clone(),
        }
    }
}
