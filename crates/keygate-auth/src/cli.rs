//! CLI module for keygate-auth.
//!
//! Administers users and sessions in whatever store the config file selects.
//! It can be used either as a standalone binary or as a subcommand of the
//! main keygate CLI.
//!
//! # Usage
//!
//! ```bash
//! # Create tables (SQL backends)
//! keygate-auth -c keygate.toml init
//!
//! # Add a user
//! keygate-auth --store-url sqlite:keygate.db add-user alice -p secret
//!
//! # List users
//! keygate-auth list-users --format json
//!
//! # Issue a session, then revoke every session of the user
//! keygate-auth issue alice --ttl-secs 3600
//! keygate-auth revoke alice
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use keygate_config::{
    CliOverrides, Config, LoggingConfig, StoreConfig, apply_overrides, load_config_or_default,
    validate_config,
};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    BcryptHasher, ControllerConfig, CredentialStore, MemoryCredentialStore, MemorySessionStore,
    NewUser, PasswordHasher, SessionController, SessionStore, format_timestamp,
};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// keygate-auth management CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keygate-auth",
    version,
    about = "Manage keygate users and sessions"
)]
pub struct AuthArgs {
    /// Config file path (json/yaml/toml). A missing file means defaults.
    #[arg(short, long, default_value = "keygate.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,

    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Output format for `list-users`.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Csv,
}

/// Auth CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommands {
    /// Create tables and other store structures.
    Init,

    /// Add a new user.
    AddUser {
        username: String,

        /// User password.
        #[arg(short, long)]
        password: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        last_name: String,

        #[arg(long, default_value = "")]
        email: String,
    },

    /// List all users.
    ListUsers {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },

    /// Delete a user.
    DeleteUser { username: String },

    /// Change a user's password.
    Passwd {
        username: String,

        /// New password.
        #[arg(short, long)]
        password: String,
    },

    /// Check a user's password.
    Check {
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Issue a session key for a user.
    Issue {
        username: String,

        /// Session lifetime in seconds (default from config).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Revoke every session of a user.
    Revoke { username: String },

    /// Delete expired sessions.
    Purge,

    /// Print a bcrypt hash of a password (for manual provisioning).
    Hash {
        password: String,

        /// bcrypt cost (default from config).
        #[arg(long)]
        cost: Option<u32>,
    },
}

/// User row for display.
#[derive(Tabled, Serialize)]
struct UserDisplay {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Last Login")]
    last_login: String,
    #[tabled(rename = "Active")]
    active: String,
}

/// Opened stores for one CLI invocation.
struct Stores {
    sessions: SessionController<Arc<dyn SessionStore>>,
    users: Arc<dyn CredentialStore>,
    #[cfg(feature = "redis")]
    kv_sessions: Option<Arc<crate::kv::KvSessionStore<crate::kv::RedisKv>>>,
}

impl Stores {
    /// Wait for background index updates before the process exits.
    async fn close(self) {
        #[cfg(feature = "redis")]
        if let Some(store) = &self.kv_sessions {
            store.flush_index().await;
        }
    }
}

/// Run the auth CLI with the given arguments.
///
/// This is the main entry point for the auth CLI, used by both the
/// standalone binary and the unified keygate CLI.
pub async fn run(args: AuthArgs) -> CliResult {
    let mut config = load_config_or_default(&args.config)?;
    apply_overrides(&mut config, &args.overrides);
    validate_config(&config)?;

    init_tracing(&config.logging);

    if let AuthCommands::Hash { password, cost } = &args.command {
        let hasher = BcryptHasher::new(cost.unwrap_or(config.sessions.bcrypt_cost));
        println!("{}", hasher.generate_hash(password.as_bytes())?);
        return Ok(());
    }

    let stores = open_stores(&config).await?;
    let result = dispatch(&stores, args.command).await;
    stores.close().await;
    result
}

async fn dispatch(stores: &Stores, command: AuthCommands) -> CliResult {
    match command {
        AuthCommands::Init => {
            stores.sessions.init().await?;
            stores.users.init().await?;
            println!("Store initialized successfully.");
        }
        AuthCommands::AddUser {
            username,
            password,
            first_name,
            last_name,
            email,
        } => {
            let user = NewUser {
                username: &username,
                first_name: &first_name,
                last_name: &last_name,
                email: &email,
            };
            let id = stores.users.insert(user, password.as_bytes()).await?;
            println!("User added successfully.");
            println!("  ID: {id}");
            println!("  Username: {username}");
        }
        AuthCommands::ListUsers { format } => list_users(stores, format).await?,
        AuthCommands::DeleteUser { username } => {
            let id = stores.users.get_user_id(&username).await?;
            stores.users.delete_user(&username).await?;
            let revoked = stores.sessions.revoke_all(id).await?;
            println!("User {username} deleted ({revoked} session(s) revoked).");
        }
        AuthCommands::Passwd { username, password } => {
            stores
                .users
                .update_password(&username, password.as_bytes())
                .await?;
            println!("Password updated.");
        }
        AuthCommands::Check { username, password } => {
            let id = stores.users.validate(&username, password.as_bytes()).await?;
            if id.is_none() {
                return Err("password mismatch".into());
            }
            println!("Password ok (user ID {id}).");
        }
        AuthCommands::Issue { username, ttl_secs } => {
            let id = stores.users.get_user_id(&username).await?;
            let (key, data) = match ttl_secs {
                Some(secs) => stores.sessions.issue(id, Duration::from_secs(secs)).await?,
                None => stores.sessions.issue_default(id).await?,
            };
            println!("{key}");
            debug!(user = %id, valid_until = %format_timestamp(data.valid_until), "session issued");
        }
        AuthCommands::Revoke { username } => {
            let id = stores.users.get_user_id(&username).await?;
            let revoked = stores.sessions.revoke_all(id).await?;
            println!("Revoked {revoked} session(s).");
        }
        AuthCommands::Purge => {
            let removed = stores.sessions.delete_invalid_keys().await?;
            println!("Deleted {removed} expired session(s).");
        }
        // handled before the stores are opened
        AuthCommands::Hash { .. } => {}
    }
    Ok(())
}

async fn open_stores(config: &Config) -> CliResult<Stores> {
    let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.sessions.bcrypt_cost));
    let controller_config = ControllerConfig::default()
        .key_length(config.sessions.key_length)
        .max_attempts(config.sessions.max_key_attempts)
        .default_ttl(Duration::from_secs(config.sessions.default_ttl_secs));

    let (sessions, users): (Arc<dyn SessionStore>, Arc<dyn CredentialStore>) = match &config.store
    {
        StoreConfig::Memory => {
            warn!("memory store selected; nothing outlives this process");
            (
                Arc::new(MemorySessionStore::new()),
                Arc::new(MemoryCredentialStore::with_hasher(hasher)),
            )
        }
        #[cfg(feature = "sql")]
        StoreConfig::Sql(sql) => {
            let backend =
                crate::sql::SqlBackend::connect(sql_store_config(sql, config.sessions.key_length))
                    .await?;
            (
                Arc::new(backend.session_store()),
                Arc::new(backend.credential_store(hasher)),
            )
        }
        #[cfg(feature = "redis")]
        StoreConfig::Redis(redis) => {
            use crate::kv::{KvCredentialStore, KvPrefixes, KvSessionStore, RedisKv};

            let prefixes = KvPrefixes {
                session: redis.session_prefix.clone(),
                user_sessions: redis.user_set_prefix.clone(),
                user: redis.user_prefix.clone(),
                user_id: redis.user_id_prefix.clone(),
                next_id_key: redis.next_id_key.clone(),
            };
            let kv = Arc::new(RedisKv::connect(&redis.url).await?);
            let kv_sessions = Arc::new(KvSessionStore::with_prefixes(kv.clone(), prefixes.clone()));
            let users = KvCredentialStore::with_hasher(kv, hasher).prefixes(prefixes);
            let sessions: Arc<dyn SessionStore> = kv_sessions.clone();
            return Ok(Stores {
                sessions: SessionController::with_config(sessions, controller_config),
                users: Arc::new(users),
                kv_sessions: Some(kv_sessions),
            });
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(format!("{} store support is not compiled in", other.kind()).into());
        }
    };

    Ok(Stores {
        sessions: SessionController::with_config(sessions, controller_config),
        users,
        #[cfg(feature = "redis")]
        kv_sessions: None,
    })
}

#[cfg(feature = "sql")]
fn sql_store_config(sql: &keygate_config::SqlConfig, key_length: usize) -> crate::sql::SqlStoreConfig {
    let mut store = crate::sql::SqlStoreConfig::new(sql.url.clone())
        .max_connections(sql.max_connections)
        .min_connections(sql.min_connections)
        .connect_timeout(Duration::from_secs(sql.connect_timeout_secs))
        .session_table(sql.session_table.clone())
        .user_table(sql.user_table.clone())
        .user_id_type(sql.user_id_type.clone())
        .key_size(key_length);
    if let Some(lock) = sql.lock_db {
        store = store.lock_db(lock);
    }
    store
}

/// List all users.
async fn list_users(stores: &Stores, format: ListFormat) -> CliResult {
    let names = stores.users.list_users().await?;
    if names.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    let mut users = Vec::with_capacity(names.len());
    for (id, username) in names {
        let info = match stores.users.get_user_base_info(&username).await {
            Ok(info) => info,
            // deleted since the listing
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };
        users.push(UserDisplay {
            id: id.0,
            name: format!("{} {}", info.first_name, info.last_name)
                .trim()
                .to_string(),
            username,
            email: info.email,
            last_login: format_timestamp(info.last_login),
            active: if info.is_active { "Yes" } else { "No" }.to_string(),
        });
    }

    match format {
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&users)?),
        ListFormat::Csv => {
            println!("id,username,name,email,last_login,active");
            for user in users {
                println!(
                    "{},{},{},{},{},{}",
                    user.id, user.username, user.name, user.email, user.last_login, user.active
                );
            }
        }
        ListFormat::Table => println!("{}", Table::new(users)),
    }
    Ok(())
}

/// Initialize tracing subscriber with the given logging configuration.
///
/// Supports:
/// - `level`: Base log level (trace, debug, info, warn, error)
/// - `format`: Output format (json, pretty, compact). Default: pretty
/// - `output`: Output target (stdout, stderr). Default: stderr
/// - `filters`: Per-module log level overrides
pub fn init_tracing(config: &LoggingConfig) {
    let base_level = config.level.as_deref().unwrap_or("info");
    let mut filter_str = base_level.to_string();

    for (module, level) in &config.filters {
        filter_str.push(',');
        filter_str.push_str(module);
        filter_str.push('=');
        filter_str.push_str(level);
    }

    let filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("info"));

    let format = config.format.as_deref().unwrap_or("pretty");
    let output = config.output.as_deref().unwrap_or("stderr");

    // try_init: the unified CLI may already have installed a subscriber
    let registry = tracing_subscriber::registry().with(filter);
    let result = match (format, output) {
        ("json", "stdout") => registry
            .with(fmt::layer().json().with_writer(io::stdout))
            .try_init(),
        ("json", _) => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        ("compact", "stdout") => registry
            .with(fmt::layer().compact().with_writer(io::stdout))
            .try_init(),
        ("compact", _) => registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .try_init(),
        (_, "stdout") => registry
            .with(fmt::layer().with_writer(io::stdout))
            .try_init(),
        _ => registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        debug!("tracing already initialized: {e}");
    }
}
