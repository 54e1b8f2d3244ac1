//! Application configuration from the environment

use crate::curriculum::CurriculumPolicy;
use crate::llm::{GenerationParams, LlmConfig};
use crate::runtime::SessionSettings;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub llm: LlmConfig,
    pub generation: GenerationParams,
    pub session: SessionSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = GenerationParams::default();
        let session_defaults = SessionSettings::default();

        Self {
            port: parse_env("SKILVYN_PORT").unwrap_or(DEFAULT_PORT),
            llm: LlmConfig::from_env(),
            generation: GenerationParams {
                temperature: parse_env("SKILVYN_TEMPERATURE").unwrap_or(defaults.temperature),
                max_tokens: parse_env("SKILVYN_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            },
            session: SessionSettings {
                max_free_messages: parse_env("SKILVYN_MAX_FREE_MESSAGES")
                    .unwrap_or(session_defaults.max_free_messages),
                curriculum_policy: parse_env::<CurriculumPolicy>("SKILVYN_CURRICULUM")
                    .unwrap_or_default(),
                idle_timeout: parse_env::<NonZeroU64>("SKILVYN_SESSION_IDLE_SECS")
                    .map_or(session_defaults.idle_timeout, |secs| {
                        Duration::from_secs(secs.get())
                    }),
            },
        }
    }
}

/// Read and parse one variable; unparseable values are logged and ignored
pub(crate) fn parse_env<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    parse_value(key, &raw)
}

pub(crate) fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("SKILVYN_PORT", " 9000 "), Some(9000));
        assert_eq!(parse_value::<u32>("SKILVYN_MAX_FREE_MESSAGES", "lots"), None);
        assert_eq!(
            parse_value::<CurriculumPolicy>("SKILVYN_CURRICULUM", "synthesized"),
            Some(CurriculumPolicy::Synthesized)
        );
    }

    #[test]
    fn test_float_parsing() {
        let t: Option<f32> = parse_value("SKILVYN_TEMPERATURE", "0.25");
        assert!(t.is_some_and(|v| (v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn test_zero_seconds_rejected() {
        assert_eq!(parse_value::<NonZeroU64>("SKILVYN_SESSION_IDLE_SECS", "0"), None);
        assert_eq!(
            parse_value::<NonZeroU64>("SKILVYN_SESSION_IDLE_SECS", "900").map(NonZeroU64::get),
            Some(900)
        );
    }
}
