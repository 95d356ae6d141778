use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use log::LevelFilter;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::logger::{LogConfig, parse_log_level};

const APP_DIR: &str = "rssnotify";
const DEFAULT_SUBJECT: &str = "[rssnotify] Updated Feeds";
const DEFAULT_SMTP_ADDR: &str = "localhost:smtp";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// What a run works on.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Feed URLs in the order they are checked. May contain duplicates.
    pub feeds: Vec<String>,
    pub db_path: PathBuf,
    pub fetch_timeout: Duration,
}

/// Where and how the notification is sent.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub to: String,
    pub from: String,
    pub subject: String,
    /// SMTP endpoint as `host:port`.
    pub addr: String,
}

/// Fully resolved configuration.
pub struct Config {
    pub run: RunConfig,
    pub mail: MailConfig,
    pub log: LogConfig,
}

/// One layer of settings, from the YAML file or the command line.
/// Unset values fall through to the layer below.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub feeds: Vec<String>,
    pub feeds_file: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub fetch_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub mail: MailSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailSettings {
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub addr: Option<String>,
}

impl Settings {
    /// Load a YAML settings file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer `over` on top of `self`. Scalars set in `over` win; feed lists
    /// are appended.
    pub fn overlay(mut self, over: Settings) -> Settings {
        self.feeds.extend(over.feeds);
        Settings {
            feeds: self.feeds,
            feeds_file: over.feeds_file.or(self.feeds_file),
            db: over.db.or(self.db),
            fetch_timeout_secs: over.fetch_timeout_secs.or(self.fetch_timeout_secs),
            log_level: over.log_level.or(self.log_level),
            log_file: over.log_file.or(self.log_file),
            mail: MailSettings {
                to: over.mail.to.or(self.mail.to),
                from: over.mail.from.or(self.mail.from),
                subject: over.mail.subject.or(self.mail.subject),
                addr: over.mail.addr.or(self.mail.addr),
            },
        }
    }

    /// Fill in defaults and read the feed list file. Entries from the file
    /// come before any feeds named directly.
    pub async fn resolve(self) -> Result<Config, ConfigError> {
        let dirs = BaseDirs::new();

        let feeds_file = match self.feeds_file {
            Some(path) => path,
            None => dirs
                .as_ref()
                .ok_or(ConfigError::NoHome)?
                .config_dir()
                .join(APP_DIR)
                .join("feeds"),
        };
        let db_path = match self.db {
            Some(path) => path,
            None => dirs
                .as_ref()
                .ok_or(ConfigError::NoHome)?
                .data_local_dir()
                .join(APP_DIR)
                .join("db"),
        };

        let mut feeds = read_feed_list(&feeds_file).await?;
        feeds.extend(self.feeds);

        let address = default_address();
        let mail = MailConfig {
            to: self.mail.to.unwrap_or_else(|| address.clone()),
            from: self.mail.from.unwrap_or(address),
            subject: self
                .mail
                .subject
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            addr: self
                .mail
                .addr
                .unwrap_or_else(|| DEFAULT_SMTP_ADDR.to_string()),
        };

        let log = LogConfig {
            console_level: self
                .log_level
                .as_deref()
                .map(parse_log_level)
                .unwrap_or(LevelFilter::Info),
            log_file: self.log_file,
            ..LogConfig::default()
        };

        Ok(Config {
            run: RunConfig {
                feeds,
                db_path,
                fetch_timeout: Duration::from_secs(
                    self.fetch_timeout_secs
                        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                ),
            },
            mail,
            log,
        })
    }
}

/// Read the feed list file. A missing file is an empty list.
pub async fn read_feed_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(parse_feed_list(&contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// One URL per line; blank lines and `#` comments are ignored.
pub fn parse_feed_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// `user@host` for the current login, as far as it can be determined.
fn default_address() -> String {
    let user = env::var("USER").or_else(|_| env::var("USERNAME")).ok();
    address_for(user, hostname())
}

/// Always a complete address, so the default passes address validation.
fn address_for(user: Option<String>, host: Option<String>) -> String {
    let user = user
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "none".to_string());
    let host = host.unwrap_or_else(|| "localhost".to_string());
    format!("{user}@{host}")
}

fn hostname() -> Option<String> {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
