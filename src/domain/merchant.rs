use crate::domain::channel::{Channel, Credentials};
use crate::domain::fee::FeeRate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlipayConfig {
    pub app_id: String,
    pub private_key: String,
    pub alipay_public_key: String,
    /// Present when the merchant is onboarded as a sub-merchant of the platform.
    pub app_auth_token: String,
    pub sys_service_provider_id: String,
    pub sign_type: String,
    pub fee: FeeRate,
    pub sandbox: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WechatConfig {
    pub app_id: String,
    pub mch_id: String,
    pub api_key: String,
    pub sub_app_id: String,
    /// Present when the merchant is onboarded as a sub-merchant of the platform.
    pub sub_mch_id: String,
    pub pem_cert: String,
    pub pem_key: String,
    pub fee: FeeRate,
    pub sandbox: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcbcConfig {
    pub app_id: String,
    pub private_key: String,
    pub icbc_public_key: String,
    pub sign_type: String,
    pub return_sign_type: String,
    pub mer_id: String,
    /// Present when the merchant is onboarded as a sub-merchant of the platform.
    pub sub_mer_id: String,
    pub fee: FeeRate,
    pub sandbox: bool,
}

/// Per-merchant payment configuration. Read-only from the engine's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantConfig {
    pub store_id: String,
    pub store_name: String,
    pub enabled: bool,
    /// Default channel. Wallet channels are ignored here, see [`MerchantConfig::default_channel`].
    pub channel: Option<Channel>,
    pub alipay: AlipayConfig,
    pub wechat: WechatConfig,
    pub icbc: IcbcConfig,
}

impl MerchantConfig {
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// The configured default channel, if it is one that may act as a default.
    pub fn default_channel(&self) -> Option<Channel> {
        self.channel.filter(|c| !c.is_wallet())
    }

    pub fn credentials(&self, channel: Channel) -> Credentials {
        match channel {
            Channel::Alipay => Credentials::Alipay(self.alipay.clone()),
            Channel::Wechat => Credentials::Wechat(self.wechat.clone()),
            Channel::Icbc => Credentials::Icbc(self.icbc.clone()),
        }
    }
}
