//! Environment-driven configuration
//!
//! Loaded once at startup and shared read-only across sessions.

use crate::error::OrchestrationError;
use crate::Result;
use rand::Rng;
use std::env;
use std::time::Duration;

const DEFAULT_MIN_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 3_000;
const DEFAULT_MEMORY_MAX_SESSIONS: usize = 5;
const DEFAULT_MEMORY_KEEP_BEST: usize = 2;
const DEFAULT_API_PORT: u16 = 8080;
const DEFAULT_AUDIT_CAPACITY: usize = crate::audit::DEFAULT_AUDIT_CAPACITY;

/// Randomized minimum delay honored before every text-generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(OrchestrationError::ConfigError(format!(
                "pacing minimum {:?} exceeds maximum {:?}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// No delay at all. Intended for tests and scripted replays.
    pub fn disabled() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw the delay for the next call.
    pub fn next_delay(&self) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if min_ms == max_ms {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            max: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub database_url: Option<String>,
    pub max_sessions: usize,
    pub keep_best: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_sessions: DEFAULT_MEMORY_MAX_SESSIONS,
            keep_best: DEFAULT_MEMORY_KEEP_BEST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub gemini_api_key: Option<String>,
    pub tools_base_url: Option<String>,
    pub pacing: Pacing,
    pub memory: MemoryConfig,
    pub api_port: u16,
    /// Audit records kept in memory before the oldest are dropped.
    pub audit_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            tools_base_url: None,
            pacing: Pacing::default(),
            memory: MemoryConfig::default(),
            api_port: DEFAULT_API_PORT,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl AgentConfig {
    /// Load `.env` (if present) and read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let min_delay = parse_or(&non_empty, "LLM_MIN_DELAY_MS", DEFAULT_MIN_DELAY_MS)?;
        let max_delay = parse_or(&non_empty, "LLM_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS)?;
        let pacing = Pacing::new(
            Duration::from_millis(min_delay),
            Duration::from_millis(max_delay),
        )?;

        let max_sessions =
            parse_or(&non_empty, "MEMORY_MAX_SESSIONS", DEFAULT_MEMORY_MAX_SESSIONS)?;
        let keep_best = parse_or(&non_empty, "MEMORY_KEEP_BEST", DEFAULT_MEMORY_KEEP_BEST)?;
        if keep_best > max_sessions {
            return Err(OrchestrationError::ConfigError(format!(
                "MEMORY_KEEP_BEST ({}) exceeds MEMORY_MAX_SESSIONS ({})",
                keep_best, max_sessions
            )));
        }

        let audit_capacity = parse_or(&non_empty, "AUDIT_MAX_RECORDS", DEFAULT_AUDIT_CAPACITY)?;
        if audit_capacity == 0 {
            return Err(OrchestrationError::ConfigError(
                "AUDIT_MAX_RECORDS must be at least 1".to_string(),
            ));
        }

        let api_port = match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                OrchestrationError::ConfigError(format!("invalid port: {}", raw))
            })?,
            None => DEFAULT_API_PORT,
        };

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            tools_base_url: non_empty("FINANCIAL_API_BASE_URL")
                .or_else(|| non_empty("TOOLS_API_BASE_URL"))
                .map(|url| url.trim_end_matches('/').to_string()),
            pacing,
            memory: MemoryConfig {
                database_url: non_empty("DATABASE_URL").or_else(|| non_empty("POSTGRES_URL")),
                max_sessions,
                keep_best,
            },
            api_port,
            audit_capacity,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has invalid value '{}'", key, raw))
        }),
        None => Ok(default),
    }
}
