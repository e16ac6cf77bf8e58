use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::model::TestCase;
use crate::sandbox::{DEFAULT_OUTPUT_LIMIT, ResourceLimits};
use crate::toolchain::ToolchainDescriptor;

#[derive(Parser)]
#[command(name = "judgebox", version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Number of sandbox workers, defaults to the available parallelism
    #[arg(long = "workers", short = 'w')]
    pub workers: Option<usize>,

    /// Path of the SQLite database file
    #[arg(long = "database")]
    pub database: Option<PathBuf>,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> Result<Config> {
        let file = std::fs::File::open(&self.config_path)
            .with_context(|| format!("Failed to open config file {}", self.config_path))?;
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file {}", self.config_path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub languages: Vec<ToolchainDescriptor>,
    #[serde(default)]
    pub challenges: Vec<ChallengeConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for challenge in &self.challenges {
            if !seen.insert(challenge.id) {
                bail!("challenge id {} is defined more than once", challenge.id);
            }
        }
        if self.limits.queue_capacity == 0 {
            bail!("limits.queue_capacity must not be 0");
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub run_time_limit_ms: MilliSecond,
    pub compile_time_limit_ms: MilliSecond,
    pub grading_time_limit_ms: MilliSecond,
    pub output_limit_bytes: usize,
    pub memory_limit_bytes: Option<u64>,
    pub cpu_time_limit_secs: Option<u64>,
    /// Jobs allowed to wait for a worker before requests are rejected
    pub queue_capacity: usize,
    pub workspace_root: Option<PathBuf>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            run_time_limit_ms: MilliSecond(5000),
            compile_time_limit_ms: MilliSecond(30000),
            grading_time_limit_ms: MilliSecond(5000),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
            memory_limit_bytes: None,
            cpu_time_limit_secs: None,
            queue_capacity: 64,
            workspace_root: None,
        }
    }
}

impl LimitsConfig {
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            run_time: self.run_time_limit_ms.into(),
            compile_time: self.compile_time_limit_ms.into(),
            output_bytes: self.output_limit_bytes,
            memory_bytes: self.memory_limit_bytes,
            cpu_seconds: self.cpu_time_limit_secs,
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("judgebox"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChallengeConfig {
    pub id: u32,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub example_input: String,
    #[serde(default)]
    pub example_output: String,
    /// Identity of the author, who may always see the test cases
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/example.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.limits.run_time_limit_ms, MilliSecond(5000));
        assert_eq!(config.challenges[0].difficulty, Difficulty::Easy);
        assert_eq!(config.challenges[0].test_cases[0].expected_output, "5");
        assert!(config.challenges.iter().all(|c| c.active || c.id == 3));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.limits, LimitsConfig::default());
        let limits = config.limits.resource_limits();
        assert_eq!(limits.run_time, Duration::from_secs(5));
        assert_eq!(limits.compile_time, Duration::from_secs(30));
        assert!(config.languages.is_empty());
    }

    #[test]
    fn test_partial_limits_keep_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"limits": {"run_time_limit_ms": 1500, "queue_capacity": 4}}"#)
                .unwrap();
        assert_eq!(config.limits.resource_limits().run_time, Duration::from_millis(1500));
        assert_eq!(config.limits.queue_capacity, 4);
        assert_eq!(config.limits.compile_time_limit_ms, MilliSecond(30000));
    }

    #[test]
    fn test_duplicate_challenge_ids_are_rejected() {
        let config: Config = serde_json::from_str(
            r#"{"challenges": [
                {"id": 1, "title": "a", "description": "a"},
                {"id": 1, "title": "b", "description": "b"}
            ]}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_difficulty_is_rejected() {
        let parsed = serde_json::from_str::<Config>(
            r#"{"challenges": [{"id": 1, "title": "a", "description": "a", "difficulty": "insane"}]}"#,
        );
        assert!(parsed.is_err());
    }
}
