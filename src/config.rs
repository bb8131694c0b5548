use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("DEFAULT_MAX_TOKENS ({default}) exceeds MAX_CONTEXT_TOKENS ({ceiling})")]
    DefaultAboveCeiling { default: u32, ceiling: u32 },
}

// order in which turns are put on the wire. some runtimes reverse
// the array internally so they need it newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageOrder {
    #[default]
    Chronological,
    Reversed,
}

impl FromStr for MessageOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {

        match s.trim().to_lowercase().as_str() {
            "chronological" | "oldest_first" => Ok(MessageOrder::Chronological),
            "reversed" | "newest_first" => Ok(MessageOrder::Reversed),
            other => Err(format!("expected `chronological` or `reversed`, got `{}`", other)),
        }

    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub service_host: String,
    pub service_port: u16,
    pub runtime_host: String,
    pub runtime_port: u16,
    pub runtime_bin: Option<PathBuf>,
    pub model_base_path: PathBuf,
    pub mock_runtime: bool,
    pub max_context_tokens: u32,
    pub default_max_tokens: u32,
    pub chat_max_attempts: u32,
    pub chat_retry_delay: Duration,
    pub reset_timeout: Duration,
    pub chat_timeout: Duration,
    pub health_timeout: Duration,
    pub message_order: MessageOrder,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            service_host: "127.0.0.1".to_string(),
            service_port: 8080,
            runtime_host: "127.0.0.1".to_string(),
            runtime_port: 8000,
            runtime_bin: None,
            model_base_path: PathBuf::from("/opt/qwen3-4b"),
            mock_runtime: false,
            max_context_tokens: 2048,
            default_max_tokens: 128,
            chat_max_attempts: 20,
            chat_retry_delay: Duration::from_millis(200),
            reset_timeout: Duration::from_secs(30),
            chat_timeout: Duration::from_secs(90),
            health_timeout: Duration::from_millis(1000),
            message_order: MessageOrder::Chronological,
        }
    }
}

impl Settings {

    pub fn from_env() -> Result<Self, ConfigError> {

        Self::from_lookup(|key| std::env::var(key).ok())

    }

    // every setting falls back to its default when the variable is unset or empty
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {

        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let settings = Settings {
            service_host: get("SERVICE_HOST").unwrap_or(defaults.service_host),
            service_port: parse(&get, "SERVICE_PORT", defaults.service_port)?,
            runtime_host: get("RUNTIME_HOST").unwrap_or(defaults.runtime_host),
            runtime_port: parse(&get, "RUNTIME_PORT", defaults.runtime_port)?,
            runtime_bin: get("RUNTIME_BIN").map(PathBuf::from),
            model_base_path: get("MODEL_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_base_path),
            // the older QWEN3_ spelling is still honoured when the short one is unset
            mock_runtime: match ["MOCK_RUNTIME", "QWEN3_MOCK_RUNTIME"]
                .into_iter()
                .find_map(|key| get(key).map(|raw| (key, raw)))
            {
                Some((key, raw)) => parse_flag(key, &raw)?,
                None => defaults.mock_runtime,
            },
            max_context_tokens: parse(&get, "MAX_CONTEXT_TOKENS", defaults.max_context_tokens)?,
            default_max_tokens: parse(&get, "DEFAULT_MAX_TOKENS", defaults.default_max_tokens)?,
            chat_max_attempts: parse(&get, "CHAT_MAX_ATTEMPTS", defaults.chat_max_attempts)?,
            chat_retry_delay: Duration::from_millis(parse(&get, "CHAT_RETRY_DELAY_MS", 200u64)?),
            reset_timeout: Duration::from_secs(parse(&get, "RESET_TIMEOUT_SECS", 30u64)?),
            chat_timeout: Duration::from_secs(parse(&get, "CHAT_TIMEOUT_SECS", 90u64)?),
            health_timeout: Duration::from_millis(parse(&get, "HEALTH_TIMEOUT_MS", 1000u64)?),
            message_order: parse(&get, "RUNTIME_MESSAGE_ORDER", defaults.message_order)?,
        };

        settings.validate()?;
        Ok(settings)

    }

    pub fn validate(&self) -> Result<(), ConfigError> {

        if self.chat_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "CHAT_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        if self.default_max_tokens > self.max_context_tokens {
            return Err(ConfigError::DefaultAboveCeiling {
                default: self.default_max_tokens,
                ceiling: self.max_context_tokens,
            });
        }

        Ok(())

    }

    pub fn runtime_base_url(&self) -> String {
        format!("http://{}:{}", self.runtime_host, self.runtime_port)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service_host, self.service_port)
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{

    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }

}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {

    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean flag".to_string(),
        }),
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_set() {

        let settings = settings_from(&[]).unwrap();

        assert_eq!(settings.service_port, 8080);
        assert_eq!(settings.runtime_base_url(), "http://127.0.0.1:8000");
        assert_eq!(settings.max_context_tokens, 2048);
        assert_eq!(settings.default_max_tokens, 128);
        assert_eq!(settings.chat_max_attempts, 20);
        assert_eq!(settings.chat_retry_delay, Duration::from_millis(200));
        assert_eq!(settings.reset_timeout, Duration::from_secs(30));
        assert_eq!(settings.chat_timeout, Duration::from_secs(90));
        assert_eq!(settings.health_timeout, Duration::from_secs(1));
        assert_eq!(settings.message_order, MessageOrder::Chronological);
        assert!(!settings.mock_runtime);
        assert!(settings.runtime_bin.is_none());

    }

    #[test]
    fn test_overrides_are_parsed() {

        let settings = settings_from(&[
            ("SERVICE_PORT", "9090"),
            ("RUNTIME_HOST", "10.0.0.2"),
            ("RUNTIME_PORT", "8123"),
            ("RUNTIME_BIN", "/usr/local/bin/main_api"),
            ("MOCK_RUNTIME", "true"),
            ("CHAT_RETRY_DELAY_MS", "50"),
            ("RUNTIME_MESSAGE_ORDER", "reversed"),
        ])
        .unwrap();

        assert_eq!(settings.service_port, 9090);
        assert_eq!(settings.runtime_base_url(), "http://10.0.0.2:8123");
        assert_eq!(settings.runtime_bin, Some(PathBuf::from("/usr/local/bin/main_api")));
        assert!(settings.mock_runtime);
        assert_eq!(settings.chat_retry_delay, Duration::from_millis(50));
        assert_eq!(settings.message_order, MessageOrder::Reversed);

    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {

        let settings = settings_from(&[("RUNTIME_BIN", ""), ("SERVICE_PORT", "  ")]).unwrap();

        assert!(settings.runtime_bin.is_none());
        assert_eq!(settings.service_port, 8080);

    }

    #[test]
    fn test_invalid_number_is_rejected() {

        let err = settings_from(&[("RUNTIME_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RUNTIME_PORT", .. }));

    }

    #[test]
    fn test_invalid_flag_is_rejected() {

        let err = settings_from(&[("MOCK_RUNTIME", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MOCK_RUNTIME", .. }));

    }

    #[test]
    fn test_legacy_mock_flag_is_honoured() {

        let settings = settings_from(&[("QWEN3_MOCK_RUNTIME", "1")]).unwrap();
        assert!(settings.mock_runtime);

        // the short name wins when both are set
        let settings = settings_from(&[("MOCK_RUNTIME", "0"), ("QWEN3_MOCK_RUNTIME", "1")]).unwrap();
        assert!(!settings.mock_runtime);

        let err = settings_from(&[("QWEN3_MOCK_RUNTIME", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "QWEN3_MOCK_RUNTIME", .. }));

    }

    #[test]
    fn test_zero_attempts_is_rejected() {

        let err = settings_from(&[("CHAT_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CHAT_MAX_ATTEMPTS", .. }));

    }

    #[test]
    fn test_default_above_ceiling_is_rejected() {

        let err = settings_from(&[("MAX_CONTEXT_TOKENS", "64"), ("DEFAULT_MAX_TOKENS", "128")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DefaultAboveCeiling { default: 128, ceiling: 64 }));

    }

    #[test]
    fn test_unknown_message_order_is_rejected() {

        let err = settings_from(&[("RUNTIME_MESSAGE_ORDER", "sideways")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RUNTIME_MESSAGE_ORDER", .. }));

    }

}
