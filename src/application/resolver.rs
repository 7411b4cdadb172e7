use crate::domain::channel::Channel;
use crate::domain::merchant::MerchantConfig;
use crate::domain::ports::{ConfigRepositoryBox, CredentialSourceBox};
use crate::error::{GatewayError, Result};
use tracing::debug;

pub const ALIPAY_APP_ID: &str = "PAY_ALIPAY_APPID";
pub const ALIPAY_PRIVATE_KEY: &str = "PAY_ALIPAY_PRIVATE_KEY";
pub const ALIPAY_PUBLIC_KEY: &str = "PAY_ALIPAY_ALIPAY_PUBLIC_KEY";
pub const ALIPAY_SIGN_TYPE: &str = "PAY_ALIPAY_SIGN_TYPE";
pub const ALIPAY_SERVICE_PROVIDER_ID: &str = "PAY_ALIPAY_SYS_SERVICE_PROVIDERID";
pub const WECHAT_APP_ID: &str = "PAY_WECHAT_APPID";
pub const WECHAT_MCH_ID: &str = "PAY_WECHAT_MCHID";
pub const WECHAT_API_KEY: &str = "PAY_WECHAT_APIKEY";
pub const WECHAT_PEM_CERT: &str = "PAY_WECHAT_PEMCERT";
pub const WECHAT_PEM_KEY: &str = "PAY_WECHAT_PEMKEY";
pub const ICBC_APP_ID: &str = "PAY_ICBC_APPID";
pub const ICBC_PRIVATE_KEY: &str = "PAY_ICBC_PRIVATE_KEY";
pub const ICBC_PUBLIC_KEY: &str = "PAY_ICBC_ICBC_PUBLIC_KEY";
pub const ICBC_SIGN_TYPE: &str = "PAY_ICBC_SIGN_TYPE";
pub const ICBC_RETURN_SIGN_TYPE: &str = "PAY_ICBC_RETURN_SIGN_TYPE";

/// Loads merchant configuration and derives the effective credentials for a request.
///
/// The stored configuration is never written back; overrides are applied to a copy.
pub struct ConfigResolver {
    configs: ConfigRepositoryBox,
    platform: CredentialSourceBox,
}

impl ConfigResolver {
    pub fn new(configs: ConfigRepositoryBox, platform: CredentialSourceBox) -> Self {
        Self { configs, platform }
    }

    /// Loads the merchant, rejecting unknown or disabled ones, and applies sub-merchant
    /// overrides.
    pub async fn load(&self, store_id: &str) -> Result<MerchantConfig> {
        let mut config = self
            .configs
            .get_by_store_id(store_id)
            .await?
            .ok_or_else(|| GatewayError::MerchantNotFound(store_id.to_string()))?;
        if !config.enabled {
            return Err(GatewayError::MerchantDisabled(store_id.to_string()));
        }
        self.apply_platform_overrides(&mut config);
        Ok(config)
    }

    /// Explicit channel, then a non-wallet default, then the shape of the payment code.
    pub fn resolve_channel(
        config: &MerchantConfig,
        requested: Option<Channel>,
        auth_code: &str,
    ) -> Result<Channel> {
        requested
            .or_else(|| config.default_channel())
            .or_else(|| Channel::detect(auth_code))
            .ok_or(GatewayError::ChannelUnresolved)
    }

    fn apply_platform_overrides(&self, config: &mut MerchantConfig) {
        let env = self.platform.as_ref();
        let over = |field: &mut String, key: &str| *field = env.get(key, field.as_str());

        if !config.alipay.app_auth_token.is_empty() {
            debug!(store_id = %config.store_id, "applying alipay platform credentials");
            let c = &mut config.alipay;
            over(&mut c.app_id, ALIPAY_APP_ID);
            over(&mut c.private_key, ALIPAY_PRIVATE_KEY);
            over(&mut c.alipay_public_key, ALIPAY_PUBLIC_KEY);
            over(&mut c.sign_type, ALIPAY_SIGN_TYPE);
            over(&mut c.sys_service_provider_id, ALIPAY_SERVICE_PROVIDER_ID);
        }
        if !config.wechat.sub_mch_id.is_empty() {
            debug!(store_id = %config.store_id, "applying wechat platform credentials");
            let c = &mut config.wechat;
            over(&mut c.app_id, WECHAT_APP_ID);
            over(&mut c.mch_id, WECHAT_MCH_ID);
            over(&mut c.api_key, WECHAT_API_KEY);
            over(&mut c.pem_cert, WECHAT_PEM_CERT);
            over(&mut c.pem_key, WECHAT_PEM_KEY);
        }
        if !config.icbc.sub_mer_id.is_empty() {
            debug!(store_id = %config.store_id, "applying icbc platform credentials");
            let c = &mut config.icbc;
            over(&mut c.app_id, ICBC_APP_ID);
            over(&mut c.private_key, ICBC_PRIVATE_KEY);
            over(&mut c.icbc_public_key, ICBC_PUBLIC_KEY);
            over(&mut c.sign_type, ICBC_SIGN_TYPE);
            over(&mut c.return_sign_type, ICBC_RETURN_SIGN_TYPE);
            c.mer_id = c.sub_mer_id.clone();
        }
    }
}
