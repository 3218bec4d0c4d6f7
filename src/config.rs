use eyre::{Context, Result};
use replyr::llm::OpenAiConfig;
use replyr::pipeline::PipelineConfig;
use replyr::scheduler::TickConfig;
use replyr::source::YoutubeConfig;
use replyr::worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerSection,
    pub pipeline: PipelineSection,
    pub llm: LlmConfig,
    pub youtube: YoutubeSection,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("replyr"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub tick_on_start: bool,
    pub task_retention_hours: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 900,
            tick_on_start: true,
            task_retention_hours: 168,
        }
    }
}

impl From<&SchedulerConfig> for TickConfig {
    fn from(c: &SchedulerConfig) -> Self {
        TickConfig::new(Duration::from_secs(c.tick_interval_secs.max(1)))
            .with_tick_on_start(c.tick_on_start)
            .with_task_retention(Duration::from_secs(c.task_retention_hours * 3600))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            retry_backoff_secs: 60,
            poll_interval_ms: 1000,
        }
    }
}

impl From<&WorkerSection> for WorkerConfig {
    fn from(c: &WorkerSection) -> Self {
        WorkerConfig {
            workers: c.workers,
            max_attempts: c.max_attempts,
            retry_backoff: Duration::from_secs(c.retry_backoff_secs),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub fetch_batch_size: u32,
    pub send_interval_ms: u64,
    pub lease_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub send_timeout_secs: u64,
    pub classify_timeout_secs: u64,
    pub generate_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            fetch_batch_size: 50,
            send_interval_ms: 2000,
            lease_ttl_secs: 900,
            fetch_timeout_secs: 30,
            send_timeout_secs: 30,
            classify_timeout_secs: 30,
            generate_timeout_secs: 60,
        }
    }
}

impl From<&PipelineSection> for PipelineConfig {
    fn from(c: &PipelineSection) -> Self {
        PipelineConfig {
            fetch_batch_size: c.fetch_batch_size,
            send_interval: Duration::from_millis(c.send_interval_ms),
            lease_ttl: Duration::from_secs(c.lease_ttl_secs),
            fetch_timeout: Duration::from_secs(c.fetch_timeout_secs),
            send_timeout: Duration::from_secs(c.send_timeout_secs),
            classify_timeout: Duration::from_secs(c.classify_timeout_secs),
            generate_timeout: Duration::from_secs(c.generate_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    pub classify_max_tokens: u32,
    pub reply_max_tokens: u32,
    pub reply_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            base_url: defaults.base_url,
            model: defaults.model,
            timeout_ms: defaults.timeout.as_millis() as u64,
            classify_max_tokens: defaults.classify_max_tokens,
            reply_max_tokens: defaults.reply_max_tokens,
            reply_temperature: defaults.reply_temperature,
        }
    }
}

impl From<&LlmConfig> for OpenAiConfig {
    fn from(c: &LlmConfig) -> Self {
        OpenAiConfig {
            base_url: c.base_url.clone(),
            model: c.model.clone(),
            timeout: Duration::from_millis(c.timeout_ms),
            classify_max_tokens: c.classify_max_tokens,
            reply_max_tokens: c.reply_max_tokens,
            reply_temperature: c.reply_temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSection {
    pub api_base: String,
    pub timeout_ms: u64,
}

impl Default for YoutubeSection {
    fn default() -> Self {
        let defaults = YoutubeConfig::default();
        Self {
            api_base: defaults.api_base,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

impl From<&YoutubeSection> for YoutubeConfig {
    fn from(c: &YoutubeSection) -> Self {
        YoutubeConfig {
            api_base: c.api_base.clone(),
            timeout: Duration::from_millis(c.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Environment variable holding the hex sealing key
    pub key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            key_env: "REPLYR_SEALING_KEY".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            worker: WorkerSection::default(),
            pipeline: PipelineSection::default(),
            llm: LlmConfig::default(),
            youtube: YoutubeSection::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_library() {
        let config = Config::default();
        let pipeline = PipelineConfig::from(&config.pipeline);
        assert_eq!(pipeline.send_interval, Duration::from_secs(2));
        assert_eq!(pipeline.lease_ttl, Duration::from_secs(900));
        assert_eq!(TickConfig::from(&config.scheduler).tick_interval, Duration::from_secs(900));
        assert_eq!(
            TickConfig::from(&config.scheduler).task_retention,
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(WorkerConfig::from(&config.worker).max_attempts, 3);
        assert_eq!(OpenAiConfig::from(&config.llm).model, OpenAiConfig::default().model);
        assert_eq!(config.credentials.key_env, "REPLYR_SEALING_KEY");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "scheduler:\n  tick_interval_secs: 60\nllm:\n  model: gpt-4o\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert!(config.scheduler.tick_on_start);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.reply_max_tokens, 150);
        assert_eq!(config.worker.workers, 2);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "storage:\n  data_dir: /tmp/replyr-test\nworker:\n  workers: 4").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/replyr-test"));
        assert_eq!(config.worker.workers, 4);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(Config::load(Some(&PathBuf::from("/nonexistent/replyr.yml"))).is_err());
    }
}
