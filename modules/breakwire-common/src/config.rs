use std::env;

use serde::{Deserialize, Serialize};

use crate::error::BreakwireError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Embedding/entity provider
    pub provider_api_key: String,
    pub provider_base_url: String,
    pub embedding_model: String,
    pub extraction_model: String,
    /// Timeout for provider calls; on expiry the caller scores neutral.
    pub provider_timeout_secs: u64,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Background cadences
    pub virality_interval_secs: u64,
    pub settlement_interval_secs: u64,

    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            provider_api_key: required_env("PROVIDER_API_KEY"),
            provider_base_url: env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            extraction_model: env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            provider_timeout_secs: parsed_env("PROVIDER_TIMEOUT_SECS", 20),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parsed_env("WEB_PORT", 3000),
            virality_interval_secs: parsed_env("VIRALITY_INTERVAL_SECS", 900),
            settlement_interval_secs: parsed_env("SETTLEMENT_INTERVAL_SECS", 1800),
            engine: engine_from_env(),
        }
    }
}

/// Scoring/settlement knobs ship as defaults but can be overridden field
/// by field through ENGINE_CONFIG (a JSON object), so thresholds move
/// without a deploy.
fn engine_from_env() -> EngineConfig {
    match env::var("ENGINE_CONFIG") {
        Ok(raw) => serde_json::from_str(&raw)
            .unwrap_or_else(|e| panic!("ENGINE_CONFIG is not valid JSON: {e}")),
        Err(_) => EngineConfig::default(),
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// All tunable scoring/settlement knobs. Kept as data, not compiled
/// constants, so thresholds can be adjusted without a deploy. Validated
/// once at load; malformed values never reach the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub virality: ViralityConfig,
    #[serde(default)]
    pub kudos: KudosConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), BreakwireError> {
        self.matching.validate()?;
        self.virality.validate()?;
        self.kudos.validate()
    }
}

/// Match scorer and decision thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Candidates below this cosine similarity are excluded outright.
    pub semantic_floor: f64,
    pub exact_threshold: f64,
    pub likely_threshold: f64,
    pub related_threshold: f64,

    /// Composite weights, must sum to 1.0.
    pub semantic_weight: f64,
    pub entity_weight: f64,
    pub temporal_weight: f64,
    pub category_weight: f64,
    pub source_weight: f64,

    /// Full temporal score within this window.
    pub temporal_peak_hours: f64,
    /// Temporal score reaches zero at this window.
    pub temporal_decay_hours: f64,

    /// How many recent stories to score against.
    pub candidate_fetch_limit: i64,
    /// How many scored candidates to return.
    pub max_candidates: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            semantic_floor: 0.50,
            exact_threshold: 0.80,
            likely_threshold: 0.60,
            related_threshold: 0.40,
            semantic_weight: 0.35,
            entity_weight: 0.35,
            temporal_weight: 0.15,
            category_weight: 0.10,
            source_weight: 0.05,
            temporal_peak_hours: 6.0,
            temporal_decay_hours: 48.0,
            candidate_fetch_limit: 100,
            max_candidates: 20,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), BreakwireError> {
        let weights = [
            self.semantic_weight,
            self.entity_weight,
            self.temporal_weight,
            self.category_weight,
            self.source_weight,
        ];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(BreakwireError::Validation(
                "match weights must each be in [0, 1]".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(BreakwireError::Validation(format!(
                "match weights must sum to 1.0, got {sum}"
            )));
        }
        for (name, t) in [
            ("semantic_floor", self.semantic_floor),
            ("exact_threshold", self.exact_threshold),
            ("likely_threshold", self.likely_threshold),
            ("related_threshold", self.related_threshold),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(BreakwireError::Validation(format!(
                    "{name} must be in [0, 1], got {t}"
                )));
            }
        }
        if self.exact_threshold < self.likely_threshold
            || self.likely_threshold < self.related_threshold
        {
            return Err(BreakwireError::Validation(
                "decision thresholds must be ordered exact >= likely >= related".into(),
            ));
        }
        if self.temporal_decay_hours <= self.temporal_peak_hours {
            return Err(BreakwireError::Validation(
                "temporal decay window must exceed the peak window".into(),
            ));
        }
        Ok(())
    }
}

/// Virality score weights and trend bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViralityConfig {
    pub article_weight: f64,
    pub social_weight: f64,
    pub search_weight: f64,
    pub engagement_weight: f64,

    /// velocity_change at or above this is `rising`, at or below the
    /// negation is `declining`.
    pub trend_band: f64,

    /// Snapshots inspected by the decay detector.
    pub decay_window: usize,
    /// Mean velocity below the negation of this over the window fires
    /// sustained decline.
    pub decay_velocity: f64,
    /// Fractional drop from peak that fires on its own.
    pub decay_drop_fraction: f64,
}

impl Default for ViralityConfig {
    fn default() -> Self {
        Self {
            article_weight: 0.30,
            social_weight: 0.30,
            search_weight: 0.25,
            engagement_weight: 0.15,
            trend_band: 5.0,
            decay_window: 3,
            decay_velocity: 5.0,
            decay_drop_fraction: 0.40,
        }
    }
}

impl ViralityConfig {
    pub fn validate(&self) -> Result<(), BreakwireError> {
        let sum = self.article_weight
            + self.social_weight
            + self.search_weight
            + self.engagement_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(BreakwireError::Validation(format!(
                "virality weights must sum to 1.0, got {sum}"
            )));
        }
        if self.decay_window < 2 {
            return Err(BreakwireError::Validation(
                "decay window must cover at least 2 snapshots".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.decay_drop_fraction) {
            return Err(BreakwireError::Validation(
                "decay drop fraction must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

/// Kudos payout constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KudosConfig {
    pub base: i64,
    /// Early bonus starts here and steps down per order position.
    pub early_bonus_max: i64,
    pub early_bonus_step: i64,
    /// Timing bonus starts here and decays per hour since first submission.
    pub timing_bonus_max: f64,
    pub timing_bonus_per_hour: f64,
    /// Original discoverer multiplier.
    pub first_discoverer_multiplier: f64,
    /// Peak score at or above this earns the separate viral bonus entry.
    pub viral_bonus_peak: f64,
}

impl Default for KudosConfig {
    fn default() -> Self {
        Self {
            base: 100,
            early_bonus_max: 100,
            early_bonus_step: 10,
            timing_bonus_max: 50.0,
            timing_bonus_per_hour: 5.0,
            first_discoverer_multiplier: 2.0,
            viral_bonus_peak: 50.0,
        }
    }
}

impl KudosConfig {
    pub fn validate(&self) -> Result<(), BreakwireError> {
        if self.base < 0 || self.early_bonus_max < 0 {
            return Err(BreakwireError::Validation(
                "kudos base and bonuses must be non-negative".into(),
            ));
        }
        if self.first_discoverer_multiplier < 1.0 {
            return Err(BreakwireError::Validation(
                "first discoverer multiplier must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}
