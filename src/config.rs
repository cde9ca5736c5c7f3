//! Environment-driven settings for embedders.
//!
//! Values come from the process environment (a `.env` file is honored via
//! dotenvy), with the crate defaults as fallback:
//!
//! - `TRACEVINE_HISTORY_CAPACITY` — broker events retained per thread
//! - `TRACEVINE_SUBSCRIBER_CAPACITY` — pending events per subscriber
//! - `TRACEVINE_PROMPT_PRICE_PER_MTOK` / `TRACEVINE_COMPLETION_PRICE_PER_MTOK`
//!   — USD pricing per million tokens
//! - `TRACEVINE_DATABASE_URL` — checkpoint database URL for the SQLite store

use crate::broker::BrokerConfig;
use crate::metrics::Pricing;

#[derive(Clone, Debug)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub pricing: Pricing,
    pub database_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            pricing: Pricing::default(),
            database_url: None,
        }
    }
}

impl Settings {
    /// Resolve settings from the environment, falling back to defaults for
    /// anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let broker = BrokerConfig::new(
            env_parse("TRACEVINE_HISTORY_CAPACITY", defaults.broker.history_capacity),
            env_parse(
                "TRACEVINE_SUBSCRIBER_CAPACITY",
                defaults.broker.subscriber_capacity,
            ),
        );
        let pricing = Pricing {
            prompt_per_mtok: env_parse(
                "TRACEVINE_PROMPT_PRICE_PER_MTOK",
                defaults.pricing.prompt_per_mtok,
            ),
            completion_per_mtok: env_parse(
                "TRACEVINE_COMPLETION_PRICE_PER_MTOK",
                defaults.pricing.completion_per_mtok,
            ),
        };

        Self {
            broker,
            pricing,
            database_url: std::env::var("TRACEVINE_DATABASE_URL").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

/// Install a global tracing subscriber honoring `RUST_LOG`, defaulting to
/// `info` for this crate. Idempotent: a second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tracevine=info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
