//! Aeromed configuration file handling
//!
//! Loads and manages the ~/.config/aeromed/config.yaml file. Mail settings
//! honor the environment variables the hosted deployment has always used
//! (`MAIL_SERVER`, `MAIL_PORT`, `MAIL_USERNAME`, `MAIL_PASSWORD`,
//! `MAIL_USE_TLS`, `MAIL_DEFAULT_SENDER`), so credentials never need to be
//! written to disk.

use crate::notify::EmailAddress;
use crate::retry::RetryConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Mail transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP server hostname
    #[serde(default = "default_mail_host")]
    pub host: String,

    /// SMTP server port (587 for STARTTLS submission)
    #[serde(default = "default_mail_port")]
    pub port: u16,

    /// Account username; usually set via MAIL_USERNAME instead
    #[serde(default)]
    pub username: Option<String>,

    /// Account password; usually set via MAIL_PASSWORD instead.
    /// Gmail accounts require an app-specific password here.
    #[serde(default)]
    pub password: Option<String>,

    /// Upgrade the session with STARTTLS
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Envelope sender and From header
    #[serde(default = "default_sender")]
    pub sender: String,

    /// Whole-session timeout in seconds
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,

    /// Hostname announced in EHLO; defaults to "localhost"
    #[serde(default)]
    pub helo_domain: Option<String>,
}

fn default_mail_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_mail_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_sender() -> String {
    "no-reply@aeromed.example".to_string()
}

fn default_mail_timeout() -> u64 {
    30
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: default_mail_host(),
            port: default_mail_port(),
            username: None,
            password: None,
            use_tls: default_true(),
            sender: default_sender(),
            timeout_secs: default_mail_timeout(),
            helo_domain: None,
        }
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The validated sender address
    pub fn sender_address(&self) -> Result<EmailAddress> {
        Ok(EmailAddress::new(&self.sender)?)
    }

    pub fn helo(&self) -> &str {
        self.helo_domain.as_deref().unwrap_or("localhost")
    }

    /// Apply the deployment's MAIL_* environment variables on top of the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MAIL_SERVER") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("MAIL_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(user) = std::env::var("MAIL_USERNAME") {
            self.username = Some(user);
        }
        if let Ok(pass) = std::env::var("MAIL_PASSWORD") {
            self.password = Some(pass);
        }
        if let Ok(tls) = std::env::var("MAIL_USE_TLS") {
            self.use_tls = matches!(tls.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Ok(sender) = std::env::var("MAIL_DEFAULT_SENDER") {
            self.sender = sender;
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("aeromed");
    path.push("missions.db");
    path
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Notification dispatch tuning
///
/// Retries are bounded by count, not time: predictable dispatch latency
/// matters more than eventual delivery, since templates are idempotent and
/// duplicates are acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Retries beyond the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    60
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Fleet and clinic operational settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Active missions (accepted/assigned/in-transit) a clinic may hold
    #[serde(default = "default_clinic_capacity")]
    pub clinic_capacity: u32,

    /// Clinic intake addresses notified of every new request
    #[serde(default)]
    pub intake_broadcast: Vec<EmailAddress>,
}

fn default_clinic_capacity() -> u32 {
    5
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            clinic_capacity: default_clinic_capacity(),
            intake_broadcast: Vec::new(),
        }
    }
}

/// Aeromed configuration
///
/// Represents the complete ~/.config/aeromed/config.yaml file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AeromedConfig {
    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub fleet: FleetConfig,
}

impl AeromedConfig {
    /// Load configuration from the default path (~/.config/aeromed/config.yaml)
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path, then apply env overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::AeromedError::Config(format!(
                "config file not found: {} (run 'aeromed init' to create it)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let mut config: AeromedConfig = serde_yaml::from_str(&contents)?;
        config.mail.apply_env_overrides();
        Ok(config)
    }

    /// Write a default config file, creating parent directories
    pub fn write_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let config = Self::default();
        fs::write(path, serde_yaml::to_string(&config)?)?;
        Ok(config)
    }

    /// The default config path (~/.config/aeromed/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("aeromed");
        path.push("config.yaml");
        path
    }
}
