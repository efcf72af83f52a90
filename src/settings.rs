use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_api_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: default_api_timeout_ms(),
            max_retries: default_api_max_retries(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StripeSettings {
    /// Default publishable key. Empty means hosted checkout unless the
    /// booking carries its own key.
    #[serde(default)]
    pub publishable_key: String,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(default = "default_checkout_base_url")]
    pub checkout_base_url: String,
    #[serde(default = "default_stripe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            publishable_key: String::new(),
            api_base: default_stripe_api_base(),
            checkout_base_url: default_checkout_base_url(),
            timeout_ms: default_stripe_timeout_ms(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CheckoutSettings {
    #[serde(default = "default_intent_timeout", with = "humantime_serde")]
    pub intent_timeout: Duration,
    #[serde(default = "default_confirm_timeout", with = "humantime_serde")]
    pub confirm_timeout: Duration,
    #[serde(default = "default_finalize_timeout", with = "humantime_serde")]
    pub finalize_timeout: Duration,
    #[serde(default = "default_action_timeout", with = "humantime_serde")]
    pub action_timeout: Duration,
    #[serde(default = "default_action_poll_interval", with = "humantime_serde")]
    pub action_poll_interval: Duration,
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            intent_timeout: default_intent_timeout(),
            confirm_timeout: default_confirm_timeout(),
            finalize_timeout: default_finalize_timeout(),
            action_timeout: default_action_timeout(),
            action_poll_interval: default_action_poll_interval(),
            session_ttl: default_session_ttl(),
        }
    }
}

/// Front-end routes the checkout navigates to.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouteSettings {
    pub login: String,
    pub payment: String,
    pub success: String,
    pub home: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            payment: "/payment".to_string(),
            success: "/payment/success".to_string(),
            home: "/".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub stripe: StripeSettings,
    #[serde(default)]
    pub checkout: CheckoutSettings,
    #[serde(default)]
    pub routes: RouteSettings,
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            stripe: StripeSettings::default(),
            checkout: CheckoutSettings::default(),
            routes: RouteSettings::default(),
            server_port: 8080,
        }
    }
}

impl Config {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: API_BASE_URL, API_TIMEOUT_MS, API_MAX_RETRIES,
    /// STRIPE_PUBLISHABLE_KEY, STRIPE_API_BASE, STRIPE_CHECKOUT_BASE_URL, STRIPE_TIMEOUT_MS,
    /// CHECKOUT_INTENT_TIMEOUT, CHECKOUT_CONFIRM_TIMEOUT, CHECKOUT_FINALIZE_TIMEOUT,
    /// CHECKOUT_ACTION_TIMEOUT, CHECKOUT_ACTION_POLL_INTERVAL, CHECKOUT_SESSION_TTL, SERVER_PORT
    pub fn load() -> Self {
        let base: Config = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new("config.toml").exists() {
            fig = fig.merge(Toml::file("config.toml"));
        }
        let mut cfg: Config = fig.extract().unwrap_or_default();
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg
    }

    pub fn from_env() -> Self {
        Self::load()
    }

    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = var("API_TIMEOUT_MS") {
            self.api.timeout_ms = v.parse().unwrap_or(self.api.timeout_ms);
        }
        if let Some(v) = var("API_MAX_RETRIES") {
            self.api.max_retries = v.parse().unwrap_or(self.api.max_retries);
        }
        if let Some(v) = var("STRIPE_PUBLISHABLE_KEY") {
            self.stripe.publishable_key = v;
        }
        if let Some(v) = var("STRIPE_API_BASE") {
            self.stripe.api_base = v;
        }
        if let Some(v) = var("STRIPE_CHECKOUT_BASE_URL") {
            self.stripe.checkout_base_url = v;
        }
        if let Some(v) = var("STRIPE_TIMEOUT_MS") {
            self.stripe.timeout_ms = v.parse().unwrap_or(self.stripe.timeout_ms);
        }
        if let Some(v) = var("CHECKOUT_INTENT_TIMEOUT") {
            self.checkout.intent_timeout = parse_duration_env(&v, self.checkout.intent_timeout);
        }
        if let Some(v) = var("CHECKOUT_CONFIRM_TIMEOUT") {
            self.checkout.confirm_timeout = parse_duration_env(&v, self.checkout.confirm_timeout);
        }
        if let Some(v) = var("CHECKOUT_FINALIZE_TIMEOUT") {
            self.checkout.finalize_timeout = parse_duration_env(&v, self.checkout.finalize_timeout);
        }
        if let Some(v) = var("CHECKOUT_ACTION_TIMEOUT") {
            self.checkout.action_timeout = parse_duration_env(&v, self.checkout.action_timeout);
        }
        if let Some(v) = var("CHECKOUT_ACTION_POLL_INTERVAL") {
            self.checkout.action_poll_interval =
                parse_duration_env(&v, self.checkout.action_poll_interval);
        }
        if let Some(v) = var("CHECKOUT_SESSION_TTL") {
            self.checkout.session_ttl = parse_duration_env(&v, self.checkout.session_ttl);
        }
        if let Some(v) = var("SERVER_PORT") {
            self.server_port = v.parse().unwrap_or(self.server_port);
        }
    }

    /// Publishable key configured for every booking, if any.
    pub fn default_publishable_key(&self) -> Option<&str> {
        let key = self.stripe.publishable_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_api_timeout_ms() -> u64 {
    15_000
}

fn default_api_max_retries() -> u32 {
    2
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_checkout_base_url() -> String {
    "https://checkout.stripe.com/c/pay".to_string()
}

fn default_stripe_timeout_ms() -> u64 {
    15_000
}

fn default_intent_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_confirm_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_finalize_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_action_timeout() -> Duration {
    Duration::from_secs(600) // 10 minutes
}

fn default_action_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(3600) // 1 hour
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("API_BASE_URL", "https://api.evertrek.test"),
            ("STRIPE_PUBLISHABLE_KEY", "pk_test_123"),
            ("CHECKOUT_INTENT_TIMEOUT", "5s"),
            ("SERVER_PORT", "9000"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.api.base_url, "https://api.evertrek.test");
        assert_eq!(cfg.default_publishable_key(), Some("pk_test_123"));
        assert_eq!(cfg.checkout.intent_timeout, Duration::from_secs(5));
        assert_eq!(cfg.server_port, 9000);
    }

    #[test]
    fn test_invalid_env_values_keep_current() {
        let mut cfg = Config::default();
        cfg.apply_env(|k| match k {
            "CHECKOUT_FINALIZE_TIMEOUT" => Some("soon".to_string()),
            "API_MAX_RETRIES" => Some("many".to_string()),
            _ => None,
        });
        assert_eq!(cfg.checkout.finalize_timeout, default_finalize_timeout());
        assert_eq!(cfg.api.max_retries, default_api_max_retries());
    }

    #[test]
    fn test_blank_publishable_key_means_none() {
        let mut cfg = Config::default();
        cfg.stripe.publishable_key = "   ".to_string();
        assert_eq!(cfg.default_publishable_key(), None);
    }
}
