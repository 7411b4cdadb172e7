use crate::domain::ports::PlatformCredentialSource;
use std::collections::HashMap;

/// Reads platform credentials from the process environment (and `.env`, once loaded).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSource;

impl PlatformCredentialSource for EnvCredentialSource {
    fn get(&self, key: &str, default: &str) -> String {
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => value,
            _ => default.to_string(),
        }
    }
}

/// Fixed platform credentials.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialSource {
    values: HashMap<String, String>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<const N: usize> From<[(&str, &str); N]> for StaticCredentialSource {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |source, (key, value)| source.with(key, value))
    }
}

impl PlatformCredentialSource for StaticCredentialSource {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_falls_back() {
        let source = StaticCredentialSource::from([("PAY_WECHAT_MCHID", "P1")]);
        assert_eq!(source.get("PAY_WECHAT_MCHID", "own"), "P1");
        assert_eq!(source.get("PAY_WECHAT_APIKEY", "own"), "own");
    }

    #[test]
    fn test_env_source_falls_back_when_unset() {
        let source = EnvCredentialSource;
        assert_eq!(
            source.get("PAYGATE_TEST_KEY_THAT_IS_NEVER_SET", "fallback"),
            "fallback"
        );
    }
}
