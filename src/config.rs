use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;
const PROVIDER_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=120;
const SESSION_TTL_RANGE: std::ops::RangeInclusive<i64> = 1..=24 * 366;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingProviderKind {
    Stripe,
    Chargebee,
}

impl BillingProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingProviderKind::Stripe => "stripe",
            BillingProviderKind::Chargebee => "chargebee",
        }
    }

    pub fn webhook_path(&self) -> &'static str {
        match self {
            BillingProviderKind::Stripe => "/stripe/webhook",
            BillingProviderKind::Chargebee => "/chargebee/webhook",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StripeSettings {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub pro_price_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChargebeeSettings {
    pub site: Option<String>,
    pub api_key: Option<String>,
    pub pro_item_price_id: Option<String>,
    pub webhook_username: Option<String>,
    pub webhook_password: Option<String>,
    /// Overrides `https://{site}.chargebee.com/api/v2`; used by tests.
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub provider: BillingProviderKind,
    pub stripe: StripeSettings,
    pub chargebee: ChargebeeSettings,
    pub provider_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub global_per_millisecond: u64,
    pub global_burst: u32,
    pub auth_per_second: u64,
    pub auth_burst: u32,
}

pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    /// Public URL of this service, always ending in `/`.
    pub public_base_url: String,
    pub bind_addr: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub auth_cookie_secure: bool,
    pub session_ttl_hours: i64,
    pub disable_multiple_sessions: bool,
    /// Accept unauthenticated Chargebee webhooks when no credentials are
    /// configured. Never enable outside local development.
    pub insecure_dev_webhooks: bool,
    pub billing: BillingSettings,
    pub rate_limit: RateLimitSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let frontend_origin =
            get("FRONTEND_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        let public_base_url = normalize_base_url(
            &get("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
        );

        let provider = match get("BILLING_PROVIDER")
            .unwrap_or_else(|| "stripe".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "stripe" => BillingProviderKind::Stripe,
            "chargebee" => BillingProviderKind::Chargebee,
            other => {
                return Err(ConfigError::Invalid {
                    name: "BILLING_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        let billing = BillingSettings {
            provider,
            stripe: StripeSettings {
                secret_key: get("STRIPE_SECRET_KEY"),
                webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
                pro_price_id: get("STRIPE_PRO_PRICE_ID"),
            },
            chargebee: ChargebeeSettings {
                site: get("CHARGEBEE_SITE"),
                api_key: get("CHARGEBEE_API_KEY"),
                pro_item_price_id: get("CHARGEBEE_PRO_ITEM_PRICE_ID"),
                webhook_username: get("CHARGEBEE_WEBHOOK_USERNAME"),
                webhook_password: get("CHARGEBEE_WEBHOOK_PASSWORD"),
                api_base_url: get("CHARGEBEE_API_BASE_URL"),
            },
            provider_timeout: Duration::from_secs(parse_in(
                get("BILLING_PROVIDER_TIMEOUT_SECS"),
                "BILLING_PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
                PROVIDER_TIMEOUT_RANGE,
            )?),
        };

        let rate_limit = RateLimitSettings {
            // Default: 200ms/token (~5 req/sec)
            global_per_millisecond: parse_or(
                get("RATE_LIMITER_MILLISECONDS"),
                "RATE_LIMITER_MILLISECONDS",
                200,
            )?,
            global_burst: parse_or(get("RATE_LIMITER_BURST"), "RATE_LIMITER_BURST", 20)?,
            auth_per_second: parse_or(
                get("RATE_LIMITER_AUTH_SECONDS"),
                "RATE_LIMITER_AUTH_SECONDS",
                1,
            )?,
            auth_burst: parse_or(get("RATE_LIMITER_AUTH_BURST"), "RATE_LIMITER_AUTH_BURST", 10)?,
        };

        Ok(Config {
            database_url,
            frontend_origin: frontend_origin.trim_end_matches('/').to_string(),
            public_base_url,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| "tenantry".to_string()),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| "tenantry-app".to_string()),
            auth_cookie_secure: parse_bool(get("AUTH_COOKIE_SECURE"), true),
            session_ttl_hours: parse_in(
                get("SESSION_TTL_HOURS"),
                "SESSION_TTL_HOURS",
                DEFAULT_SESSION_TTL_HOURS,
                SESSION_TTL_RANGE,
            )?,
            disable_multiple_sessions: parse_bool(get("DISABLE_MULTIPLE_SESSIONS"), false),
            insecure_dev_webhooks: parse_bool(get("INSECURE_DEV_WEBHOOKS"), false),
            billing,
            rate_limit,
        })
    }
}

fn normalize_base_url(url: &str) -> String {
    format!("{}/", url.trim().trim_end_matches('/'))
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => {
            true
        }
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => {
            false
        }
        _ => default,
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_in<T>(
    value: Option<String>,
    name: &'static str,
    default: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + ToString,
{
    let parsed = parse_or(value, name, default)?;
    if range.contains(&parsed) {
        Ok(parsed)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: parsed.to_string(),
        })
    }
}
