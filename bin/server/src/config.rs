//! Centralized server configuration.
//!
//! Loaded via the `config` crate from an optional `threadline.toml` file
//! and then environment variables (`__` separates nested keys, e.g.
//! `ATTACHMENTS__MAX_BYTES`).

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use threadline_core::{ParseIdError, UserId};
use threadline_messaging::Participant;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// PostgreSQL connection URL. Without one the server runs in memory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Connection pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Attachment storage settings.
    #[serde(default)]
    pub attachments: AttachmentConfig,

    /// Notification delivery settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Users registered at startup in in-memory mode.
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Attachment storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentConfig {
    /// Directory blobs are written to and served from.
    #[serde(default = "default_attachment_dir")]
    pub dir: PathBuf,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            dir: default_attachment_dir(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// Notification delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// NATS server URL. When unset, notifications are stored instead.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject prefix; the recipient ID is appended.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// A user seeded into the in-memory identity directory.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    /// User ID, with or without the `usr_` prefix.
    pub id: String,
    pub display_name: String,
}

impl SeedUser {
    /// Parses the seed into a participant record.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is malformed.
    pub fn participant(&self) -> Result<Participant, ParseIdError> {
        let id = UserId::from_str(&self.id)?;
        Ok(Participant::new(id, self.display_name.clone()))
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_max_connections() -> u32 {
    5
}

fn default_attachment_dir() -> PathBuf {
    PathBuf::from("./data/attachments")
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_subject_prefix() -> String {
    "threadline.notifications".to_string()
}

impl ServerConfig {
    /// Loads configuration from `threadline.toml` (if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("threadline").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn from_toml(toml: &str) -> ServerConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize")
    }

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = from_toml("");
        assert_eq!(config.listen_addr, default_listen_addr());
        assert!(config.database_url.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.attachments.dir, PathBuf::from("./data/attachments"));
        assert_eq!(config.attachments.max_bytes, 10 * 1024 * 1024);
        assert!(config.notifications.nats_url.is_none());
        assert_eq!(
            config.notifications.subject_prefix,
            "threadline.notifications"
        );
        assert!(config.users.is_empty());
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config = from_toml(
            r#"
            listen_addr = "0.0.0.0:8080"
            database_url = "postgres://localhost/threadline"

            [attachments]
            max_bytes = 1024

            [notifications]
            nats_url = "nats://localhost:4222"
            "#,
        );
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/threadline")
        );
        assert_eq!(config.attachments.max_bytes, 1024);
        assert_eq!(config.attachments.dir, default_attachment_dir());
        assert_eq!(
            config.notifications.nats_url.as_deref(),
            Some("nats://localhost:4222")
        );
    }

    #[test]
    fn seed_users_parse_with_prefix() {
        let id = UserId::new();
        let config = from_toml(&format!(
            r#"
            [[users]]
            id = "{id}"
            display_name = "alice"
            "#
        ));
        let participant = config.users[0].participant().expect("valid id");
        assert_eq!(participant.id, id);
        assert_eq!(participant.display_name, "alice");
    }

    #[test]
    fn malformed_seed_user_is_rejected() {
        let seed = SeedUser {
            id: "not-an-id".to_string(),
            display_name: "x".to_string(),
        };
        assert!(seed.participant().is_err());
    }
}
