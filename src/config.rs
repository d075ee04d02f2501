use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Config file picked up from the working directory when none is given.
const CWD_CONFIG: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "BIND_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Persistence provider (memory, surrealdb)
    #[arg(long, env = "STORE_PROVIDER")]
    pub store: Option<String>,

    /// Document store connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
    pub listing: ListingConfig,
    pub guests: GuestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Upper bound for plain HTTP requests. Streaming connections are exempt.
    pub request_timeout_secs: u64,
    /// Interval between keepalive pings on streaming connections.
    pub ping_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    pub provider: String,
    pub database_url: String,
    pub namespace: String,
    pub database: String,
    /// Per-call bound on store operations.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    /// Default cap on the unanswered-sessions listing.
    pub unanswered_limit: usize,
    /// Shuffle the capped listing instead of returning it newest first.
    pub shuffle_unanswered: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuestConfig {
    /// Avatar URL for new guests; `{seed}` is replaced by the user id.
    pub avatar_url_template: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `compact` or `json`.
    pub format: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.ping_interval_secs", 30)?
            .set_default("persistence.provider", "memory")?
            .set_default("persistence.database_url", "")?
            .set_default("persistence.namespace", "qa")?
            .set_default("persistence.database", "relay")?
            .set_default("persistence.timeout_ms", 5000)?
            .set_default("listing.unanswered_limit", 20)?
            .set_default("listing.shuffle_unanswered", false)?
            .set_default(
                "guests.avatar_url_template",
                "https://api.dicebear.com/9.x/thumbs/svg?seed={seed}",
            )?
            .set_default("logging.format", "compact")?;

        // 2. Config file: explicit path, else ./config.yaml when present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if Path::new(CWD_CONFIG).exists() {
            builder = builder.add_source(File::with_name(CWD_CONFIG));
        }

        // 3. Environment variables prefixed with RELAY_, e.g. RELAY_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env fallbacks) win over everything else
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(store) = cli.store {
            builder = builder.set_override("persistence.provider", store)?;
        }
        if let Some(url) = cli.database_url {
            builder = builder.set_override("persistence.database_url", url)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}
