use crate::domain::gateway::Credentials;
use crate::domain::ports::{GatewaySettings, SettingsProvider};
use crate::error::{ReconcileError, Result};
use crate::infrastructure::razorpay::{DEFAULT_API_BASE, DEFAULT_TIMEOUT};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(900);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub timeout: Duration,
}

/// Process-level configuration. Credentials are not part of it; they come from a
/// [`SettingsProvider`] such as [`EnvSettings`] each time they are needed.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub sweep_interval: Duration,
}

/// Loads `.env` (if any) and reads configuration from the environment.
pub fn load() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let gateway = GatewayConfig {
        api_base: optional("RAZORPAY_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
        timeout: parsed::<u64>("RAZORPAY_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
    };

    let sweep_interval = parsed::<u64>("RECONCILE_INTERVAL_SECS")?
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL);

    Ok(AppConfig {
        gateway,
        sweep_interval,
    })
}

fn gateway_settings_from_env() -> Result<GatewaySettings> {
    Ok(GatewaySettings {
        credentials: Credentials::new(
            required("RAZORPAY_API_KEY")?,
            required("RAZORPAY_API_SECRET")?,
        ),
        sandbox: flag("RAZORPAY_SANDBOX")?.unwrap_or(false),
    })
}

/// Reads gateway settings from the process environment on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn gateway_settings(&self) -> Result<GatewaySettings> {
        gateway_settings_from_env()
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| ReconcileError::Config(format!("{key} is not set")))
}

fn parsed<T: FromStr>(key: &str) -> Result<Option<T>> {
    optional(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ReconcileError::Config(format!("{key} is invalid: {raw}")))
        })
        .transpose()
}

/// Boolean switch: `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`, in any case.
fn flag(key: &str) -> Result<Option<bool>> {
    optional(key)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ReconcileError::Config(format!("{key} is invalid: {raw}"))),
        })
        .transpose()
}
