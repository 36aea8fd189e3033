pub mod aggregate;
pub mod analysts;
pub mod domain;
pub mod engine;
pub mod error;
pub mod llm;
pub mod market;
pub mod progress;
pub mod risk;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    use crate::aggregate::QuantityScaling;

    const DEFAULT_ANALYST_TIMEOUT_SECS: u64 = 90;
    const DEFAULT_PRICE_TIMEOUT_SECS: u64 = 20;
    const DEFAULT_MAX_CONCURRENCY: usize = 8;
    const DEFAULT_POSITION_LIMIT_FRACTION: f64 = 0.20;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub openai_api_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub price_base_url: Option<String>,
        pub analyst_timeout: Duration,
        pub price_timeout: Duration,
        pub max_concurrency: usize,
        pub position_limit_fraction: f64,
        pub quantity_scaling: QuantityScaling,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                openai_api_key: None,
                anthropic_api_key: None,
                sentry_dsn: None,
                price_base_url: None,
                analyst_timeout: Duration::from_secs(DEFAULT_ANALYST_TIMEOUT_SECS),
                price_timeout: Duration::from_secs(DEFAULT_PRICE_TIMEOUT_SECS),
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                position_limit_fraction: DEFAULT_POSITION_LIMIT_FRACTION,
                quantity_scaling: QuantityScaling::Linear,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let quantity_scaling = match std::env::var("DECISION_QUANTITY_SCALING") {
                Ok(s) if !s.trim().is_empty() => s
                    .parse::<QuantityScaling>()
                    .map_err(|e| anyhow::anyhow!("DECISION_QUANTITY_SCALING is invalid: {e}"))?,
                _ => defaults.quantity_scaling,
            };

            let position_limit_fraction = parse_limit_fraction(
                std::env::var("RISK_POSITION_LIMIT_FRACTION").ok().as_deref(),
                defaults.position_limit_fraction,
            )?;

            Ok(Self {
                openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                price_base_url: std::env::var("PRICE_BASE_URL").ok(),
                analyst_timeout: env_parse::<u64>("ANALYST_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.analyst_timeout),
                price_timeout: env_parse::<u64>("PRICE_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.price_timeout),
                max_concurrency: env_parse::<usize>("ANALYSIS_MAX_CONCURRENCY")
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.max_concurrency),
                position_limit_fraction,
                quantity_scaling,
            })
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

    /// Blank or missing falls back to `default`; anything else must parse into [0, 1].
    fn parse_limit_fraction(raw: Option<&str>, default: f64) -> anyhow::Result<f64> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(default);
        };
        let fraction = raw
            .parse::<f64>()
            .with_context(|| format!("RISK_POSITION_LIMIT_FRACTION is not a number: {raw}"))?;
        anyhow::ensure!(
            fraction.is_finite() && (0.0..=1.0).contains(&fraction),
            "RISK_POSITION_LIMIT_FRACTION must be within [0, 1] (got {fraction})"
        );
        Ok(fraction)
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

}
