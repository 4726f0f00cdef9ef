use std::time::Duration;

use crate::settings::{ColorPalette, SettingsProps};
use crate::webhooks::{DeliveryMode, WebhookEndpoints, WebhookTarget};

const DEFAULT_PRIMARY_WEBHOOK_URL: &str = "https://formcarry.com/s/ZIcifdwx6ev";
const DEFAULT_SECONDARY_WEBHOOK_URL: &str =
    "https://loansone-simple-iframe-sendtozoho.bailey-3eb.workers.dev/";
const DEFAULT_GEOLOCATION_BASE_URL: &str = "https://ipapi.co";
const DEFAULT_THANK_YOU_URL: &str = "https://loansone.com.au/thank-you-unsecured2/";
const DEFAULT_REDIRECT_BRAND: &str = "LoansOne";
const DEFAULT_GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Brand that sends the visitor to a thank-you page after submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    /// Compared case-insensitively with the resolved brand.
    pub brand: String,
    pub url: String,
}

impl RedirectRule {
    pub fn applies_to(&self, brand: &str) -> bool {
        brand.eq_ignore_ascii_case(&self.brand)
    }
}

/// Per-client request quota, as taken by `tower_governor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Seconds after which one request of the quota is replenished.
    pub per_second: u64,
    pub burst_size: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            per_second: 10,
            burst_size: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub webhooks: WebhookEndpoints,
    pub geolocation_base_url: String,
    pub geolocation_timeout: Duration,
    /// Whether `X-Forwarded-For` / `X-Real-IP` name the visitor. Only safe
    /// behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
    /// Applied to the form page and the API routes.
    pub rate_limit: RateLimit,
    pub redirect: RedirectRule,
    /// Deployment-supplied form settings ("props").
    pub form_defaults: SettingsProps,
    pub palette: ColorPalette,
    pub overlay_message_delay: Duration,
    pub verification_enabled: bool,
    /// Per-request webhook timeout. `None` waits for as long as it takes.
    pub webhook_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            webhooks: WebhookEndpoints {
                primary: WebhookTarget {
                    name: "Formcarry".to_string(),
                    url: DEFAULT_PRIMARY_WEBHOOK_URL.to_string(),
                    mode: DeliveryMode::Cors,
                },
                secondary: WebhookTarget {
                    name: "Cloudflare Worker".to_string(),
                    url: DEFAULT_SECONDARY_WEBHOOK_URL.to_string(),
                    mode: DeliveryMode::NoCors,
                },
            },
            geolocation_base_url: DEFAULT_GEOLOCATION_BASE_URL.to_string(),
            geolocation_timeout: DEFAULT_GEOLOCATION_TIMEOUT,
            trust_proxy_headers: false,
            rate_limit: RateLimit::default(),
            redirect: RedirectRule {
                brand: DEFAULT_REDIRECT_BRAND.to_string(),
                url: DEFAULT_THANK_YOU_URL.to_string(),
            },
            form_defaults: SettingsProps {
                country: Some("AU".to_string()),
                button_color: Some("#000000".to_string()),
                lead_source: Some("LoansOne Legacy".to_string()),
                brand: Some("N/A".to_string()),
                button_text: Some("Submit".to_string()),
            },
            palette: ColorPalette::default(),
            overlay_message_delay: crate::overlay::DEFAULT_MESSAGE_DELAY,
            verification_enabled: false,
            webhook_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            webhooks: WebhookEndpoints {
                primary: WebhookTarget {
                    url: http_url_var("PRIMARY_WEBHOOK_URL", &defaults.webhooks.primary.url)?,
                    ..defaults.webhooks.primary
                },
                secondary: WebhookTarget {
                    url: http_url_var("SECONDARY_WEBHOOK_URL", &defaults.webhooks.secondary.url)?,
                    ..defaults.webhooks.secondary
                },
            },
            geolocation_base_url: http_url_var(
                "GEOLOCATION_BASE_URL",
                &defaults.geolocation_base_url,
            )?
            .trim_end_matches('/')
            .to_string(),
            geolocation_timeout: match optional_var("GEOLOCATION_TIMEOUT_SECS") {
                Some(secs) => Duration::from_secs(secs.parse().map_err(|_| {
                    anyhow::anyhow!("GEOLOCATION_TIMEOUT_SECS must be a whole number of seconds")
                })?),
                None => defaults.geolocation_timeout,
            },
            trust_proxy_headers: match optional_var("TRUST_PROXY_HEADERS") {
                Some(flag) => flag.parse().map_err(|_| {
                    anyhow::anyhow!("TRUST_PROXY_HEADERS must be true or false")
                })?,
                None => defaults.trust_proxy_headers,
            },
            rate_limit: RateLimit {
                per_second: match optional_var("RATE_LIMIT_PER_SECOND") {
                    Some(n) => n.parse().map_err(|_| {
                        anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a positive number")
                    })?,
                    None => defaults.rate_limit.per_second,
                },
                burst_size: match optional_var("RATE_LIMIT_BURST") {
                    Some(n) => n.parse().map_err(|_| {
                        anyhow::anyhow!("RATE_LIMIT_BURST must be a positive number")
                    })?,
                    None => defaults.rate_limit.burst_size,
                },
            },
            redirect: RedirectRule {
                brand: std::env::var("REDIRECT_BRAND")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(defaults.redirect.brand),
                url: http_url_var("THANK_YOU_URL", &defaults.redirect.url)?,
            },
            form_defaults: SettingsProps {
                country: defaults.form_defaults.country,
                button_color: optional_var("DEFAULT_BUTTON_COLOR")
                    .or(defaults.form_defaults.button_color),
                lead_source: optional_var("DEFAULT_LEAD_SOURCE")
                    .or(defaults.form_defaults.lead_source),
                brand: optional_var("DEFAULT_BRAND").or(defaults.form_defaults.brand),
                button_text: optional_var("DEFAULT_BUTTON_TEXT")
                    .or(defaults.form_defaults.button_text),
            },
            palette: defaults.palette,
            overlay_message_delay: match optional_var("OVERLAY_MESSAGE_DELAY_MS") {
                Some(ms) => Duration::from_millis(ms.parse().map_err(|_| {
                    anyhow::anyhow!("OVERLAY_MESSAGE_DELAY_MS must be a number of milliseconds")
                })?),
                None => defaults.overlay_message_delay,
            },
            verification_enabled: match optional_var("VERIFICATION_ENABLED") {
                Some(flag) => flag.parse().map_err(|_| {
                    anyhow::anyhow!("VERIFICATION_ENABLED must be true or false")
                })?,
                None => defaults.verification_enabled,
            },
            webhook_timeout: match optional_var("WEBHOOK_TIMEOUT_SECS") {
                Some(secs) => Some(Duration::from_secs(secs.parse().map_err(|_| {
                    anyhow::anyhow!("WEBHOOK_TIMEOUT_SECS must be a whole number of seconds")
                })?)),
                None => defaults.webhook_timeout,
            },
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Primary webhook: {}", config.webhooks.primary.url);
        tracing::debug!("Secondary webhook: {}", config.webhooks.secondary.url);
        tracing::debug!("Geolocation base URL: {}", config.geolocation_base_url);
        tracing::debug!(
            "Redirect brand '{}' -> {}",
            config.redirect.brand,
            config.redirect.url
        );
        tracing::debug!(
            "Rate limit: burst {}, one request back every {}s; proxy headers trusted: {}",
            config.rate_limit.burst_size,
            config.rate_limit.per_second,
            config.trust_proxy_headers
        );
        if config.verification_enabled {
            tracing::info!("Verification routes enabled");
        }
        if config.webhook_timeout.is_none() {
            tracing::debug!("No webhook timeout configured");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Reads an http(s) URL from the environment, falling back to `default`.
fn http_url_var(key: &str, default: &str) -> anyhow::Result<String> {
    let raw = optional_var(key).unwrap_or_else(|| default.to_string());
    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(raw)
}
