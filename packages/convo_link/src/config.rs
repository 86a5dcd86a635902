use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::connection::BackoffPolicy;
use crate::error::ConfigError;
use crate::session::SessionSettings;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [reconnect]
//                    max_attempts = 5
//
//   env var:         CONVO_RECONNECT__MAX_ATTEMPTS=5   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub history: HistoryFileConfig,
    #[serde(default)]
    pub reconnect: ReconnectFileConfig,
    #[serde(default)]
    pub polling: PollingFileConfig,
    #[serde(default)]
    pub resync: ResyncFileConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            history: HistoryFileConfig::default(),
            reconnect: ReconnectFileConfig::default(),
            polling: PollingFileConfig::default(),
            resync: ResyncFileConfig::default(),
        }
    }
}

/// Lives under `[history]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryFileConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for HistoryFileConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Reconnect backoff (lives under `[reconnect]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectFileConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectFileConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingFileConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollingFileConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResyncFileConfig {
    #[serde(default = "default_resync_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResyncFileConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_resync_timeout_ms(),
        }
    }
}

fn default_server_url() -> String {
    "ws://127.0.0.1:8080/ws/web".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_resync_timeout_ms() -> u64 {
    5000
}

/// Build a figment that layers: defaults → config.toml → CONVO_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CONVO_SERVER_URL=wss://host/ws/web`  →  `server_url = "wss://host/ws/web"`
///   `CONVO_POLLING__INTERVAL_MS=1000`     →  `polling.interval_ms = 1000`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("CONVO_").split("__"))
}

// =============================================================================
// Runtime config (resolved from FileConfig)
// =============================================================================

/// Floor for the poll and resync timers. A zero period would re-arm the
/// poll timer immediately and clear the resync flag before any reply.
const MIN_TIMER_MS: u64 = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub server_url: String,
    pub backoff: BackoffPolicy,
    pub session: SessionSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            server_url: fc.server_url.clone(),
            backoff: BackoffPolicy {
                base: Duration::from_millis(fc.reconnect.base_delay_ms),
                max: Duration::from_millis(fc.reconnect.max_delay_ms),
                max_attempts: fc.reconnect.max_attempts,
            },
            session: SessionSettings {
                page_size: fc.history.page_size.max(1),
                poll_interval: Duration::from_millis(fc.polling.interval_ms.max(MIN_TIMER_MS)),
                resync_timeout: Duration::from_millis(fc.resync.timeout_ms.max(MIN_TIMER_MS)),
            },
        }
    }

    /// Extract and resolve the layered configuration for `data_dir`.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let fc: FileConfig = load_config(data_dir)
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))?;
        Ok(Self::from_file(&fc))
    }
}

// =============================================================================
// Directory layout (derived from --data-dir, not tunable via figment)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ConvoPaths {
    pub data_dir: PathBuf,
}

impl ConvoPaths {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".convo"),
        };

        std::fs::create_dir_all(&data_dir).map_err(|source| ConfigError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        info!("Data directory: {}", data_dir.display());
        Ok(Self { data_dir })
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── FileConfig ──────────────────────────────────────────────────────

    #[test]
    fn test_defaults_reproduce_backoff() {
        let config = ClientConfig::default();
        assert_eq!(config.backoff, BackoffPolicy::default());
        assert_eq!(config.session, SessionSettings::default());
        assert_eq!(config.server_url, "ws://127.0.0.1:8080/ws/web");
    }

    #[test]
    fn test_zero_page_size_is_raised() {
        let mut fc = FileConfig::default();
        fc.history.page_size = 0;
        assert_eq!(ClientConfig::from_file(&fc).session.page_size, 1);
    }

    // ── ConvoPaths ──────────────────────────────────────────────────────

    #[test]
    fn test_paths_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let paths = ConvoPaths::new(Some(dir.clone())).unwrap();
        assert!(dir.exists());
        assert_eq!(paths.credentials_path(), dir.join("credentials"));
        assert_eq!(paths.config_toml_path(), dir.join("config.toml"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.history.page_size, 50);
        assert_eq!(fc.reconnect.max_attempts, 10);
        assert_eq!(fc.polling.interval_ms, 3000);
        assert_eq!(fc.resync.timeout_ms, 5000);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "server_url = \"wss://convo.example/ws/web\"\n[reconnect]\nmax_attempts = 3\nbase_delay_ms = 250\n",
        )
        .unwrap();
        let config = ClientConfig::load(tmp.path()).unwrap();
        assert_eq!(config.server_url, "wss://convo.example/ws/web");
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.backoff.max, Duration::from_millis(30000));
    }

    #[test]
    fn test_load_config_zero_timers_are_raised() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[polling]\ninterval_ms = 0\n[resync]\ntimeout_ms = 0\n",
        )
        .unwrap();
        let config = ClientConfig::load(tmp.path()).unwrap();
        assert_eq!(config.session.poll_interval, Duration::from_millis(100));
        assert_eq!(config.session.resync_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[history]\npage_size = \"lots\"\n",
        )
        .unwrap();
        assert!(matches!(
            ClientConfig::load(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
