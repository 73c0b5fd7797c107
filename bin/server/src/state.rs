//! Shared application state and backend assembly.

use crate::attachments::FsAttachmentStore;
use crate::config::ServerConfig;
use crate::db::{
    PgConversationDirectory, PgIdentityLookup, PgMessageLog, PgNotificationStore,
    PgSideChatRegistry,
};
use crate::notify::NatsNotifier;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use threadline_messaging::memory::{MemoryIdentityLookup, MemoryNotifier, MemoryStore};
use threadline_messaging::{Backends, MessagingService, NotificationEmitter, Participant};
use tracing::info;

/// Shared application state.
pub struct AppState {
    /// Messaging operations.
    pub service: MessagingService,
    /// Directory attachment blobs are served from.
    pub attachment_dir: PathBuf,
    /// Largest accepted attachment, in bytes.
    pub max_attachment_bytes: usize,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        service: MessagingService,
        attachment_dir: PathBuf,
        max_attachment_bytes: usize,
    ) -> Self {
        Self {
            service,
            attachment_dir,
            max_attachment_bytes,
        }
    }

    /// Builds the state described by `config`.
    ///
    /// With a database URL the stores run on PostgreSQL (migrations are
    /// applied first); otherwise everything lives in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be reached or a seed user is invalid.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, StartupError> {
        let seeds = config
            .users
            .iter()
            .map(|seed| {
                seed.participant().map_err(|e| StartupError::SeedUser {
                    details: e.to_string(),
                })
            })
            .collect::<Result<Vec<Participant>, _>>()?;

        let attachments = Arc::new(FsAttachmentStore::new(
            config.attachments.dir.clone(),
            config.attachments.max_bytes,
        ));
        let nats = match &config.notifications.nats_url {
            Some(url) => {
                info!(%url, "Connecting to NATS");
                let notifier = NatsNotifier::connect(url, &config.notifications.subject_prefix)
                    .await
                    .map_err(|e| StartupError::Notifications {
                        details: e.to_string(),
                    })?;
                Some(Arc::new(notifier) as Arc<dyn NotificationEmitter>)
            }
            None => None,
        };

        let backends = match &config.database_url {
            Some(url) => {
                let pool = connect(url, config.database.max_connections).await?;
                let identities = PgIdentityLookup::new(pool.clone());
                for participant in &seeds {
                    identities
                        .upsert(participant)
                        .await
                        .map_err(|e| StartupError::Database {
                            details: e.to_string(),
                        })?;
                }
                let notifier: Arc<dyn NotificationEmitter> = match nats {
                    Some(nats) => nats,
                    None => Arc::new(PgNotificationStore::new(pool.clone())),
                };
                Backends {
                    directory: Arc::new(PgConversationDirectory::new(pool.clone())),
                    messages: Arc::new(PgMessageLog::new(pool.clone())),
                    side_chats: Arc::new(PgSideChatRegistry::new(pool)),
                    identities: Arc::new(identities),
                    attachments: attachments.clone(),
                    notifier,
                }
            }
            None => {
                info!(users = seeds.len(), "Running with in-memory storage");
                let store = Arc::new(MemoryStore::new());
                Backends {
                    directory: store.clone(),
                    messages: store.clone(),
                    side_chats: store,
                    identities: Arc::new(MemoryIdentityLookup::with_participants(seeds)),
                    attachments: attachments.clone(),
                    notifier: match nats {
                        Some(nats) => nats,
                        None => Arc::new(MemoryNotifier::new()),
                    },
                }
            }
        };

        Ok(Self::new(
            MessagingService::new(backends),
            attachments.dir().to_path_buf(),
            config.attachments.max_bytes,
        ))
    }
}

async fn connect(url: &str, max_connections: u32) -> Result<PgPool, StartupError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StartupError::Migration {
            details: e.to_string(),
        })?;
    Ok(pool)
}

/// Errors raised while assembling the server.
#[derive(Debug)]
pub enum StartupError {
    /// A configured seed user is invalid.
    SeedUser { details: String },
    /// The database could not be reached.
    Database { details: String },
    /// Migrations failed.
    Migration { details: String },
    /// The notification transport could not be reached.
    Notifications { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeedUser { details } => write!(f, "invalid seed user: {details}"),
            Self::Database { details } => write!(f, "database unavailable: {details}"),
            Self::Migration { details } => write!(f, "migration failed: {details}"),
            Self::Notifications { details } => {
                write!(f, "notification transport unavailable: {details}")
            }
        }
    }
}

impl std::error::Error for StartupError {}
