//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::BTreeMap, net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheBackendConfig, DEFAULT_BACKEND, DEFAULT_CACHE_NAME};
use crate::domain::uri::{DEFAULT_EXTENSION, DEFAULT_LANGUAGE, DEFAULT_SCHEME, UriDefaults};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "djedi";
const ENV_PREFIX: &str = "DJEDI";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;

/// Command-line arguments for the djedi binary.
#[derive(Debug, Parser)]
#[command(name = "djedi", version, about = "Versioned content node server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DJEDI_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the node API.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the durable node store.
    #[arg(long = "storage-backend", value_name = "BACKEND", value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Override the cache backend used for nodes.
    #[arg(long = "cache-name", value_name = "NAME")]
    pub cache_name: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub uri: UriDefaults,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub name: String,
    pub warm_on_publish: bool,
    pub backends: BTreeMap<String, CacheBackendConfig>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    storage: RawStorageSettings,
    uri: RawUriSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<StorageBackend>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUriSettings {
    scheme: Option<String>,
    language: Option<String>,
    extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    name: Option<String>,
    warm_on_publish: Option<bool>,
    backends: BTreeMap<String, RawCacheBackend>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheBackend {
    capacity: Option<usize>,
    instrumented: Option<bool>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.storage_backend {
            self.storage.backend = Some(backend);
        }
        if let Some(name) = overrides.cache_name.as_ref() {
            self.cache.name = Some(name.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            storage,
            uri,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let storage = build_storage_settings(storage, &database)?;
        let uri = build_uri_settings(uri)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            logging,
            database,
            storage,
            uri,
            cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_storage_settings(
    storage: RawStorageSettings,
    database: &DatabaseSettings,
) -> Result<StorageSettings, LoadError> {
    let backend = storage.backend.unwrap_or_default();
    if backend == StorageBackend::Postgres && database.url.is_none() {
        return Err(LoadError::invalid(
            "database.url",
            "required when storage.backend is `postgres`",
        ));
    }
    Ok(StorageSettings { backend })
}

fn build_uri_settings(uri: RawUriSettings) -> Result<UriDefaults, LoadError> {
    let scheme = uri_part(uri.scheme, DEFAULT_SCHEME, "uri.scheme", &[':', '/', '@', '#'])?;
    let language = uri_part(uri.language, DEFAULT_LANGUAGE, "uri.language", &['/', '@', '#'])?;
    let extension = uri_part(
        uri.extension,
        DEFAULT_EXTENSION,
        "uri.extension",
        &['/', '.', '#'],
    )?;
    Ok(UriDefaults {
        scheme,
        language,
        extension,
    })
}

fn uri_part(
    value: Option<String>,
    default: &str,
    key: &'static str,
    forbidden: &[char],
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let value = value.trim();
    if value.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    if value.contains(forbidden) {
        return Err(LoadError::invalid(
            key,
            format!("`{value}` contains a reserved character"),
        ));
    }
    Ok(value.to_string())
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let name = cache
        .name
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_NAME.to_string());
    if name.is_empty() {
        return Err(LoadError::invalid("cache.name", "must not be empty"));
    }

    let mut backends = BTreeMap::new();
    for (backend_name, raw) in cache.backends {
        let defaults = CacheBackendConfig::default();
        let capacity = raw.capacity.unwrap_or(defaults.capacity);
        if capacity == 0 {
            return Err(LoadError::invalid(
                "cache.backends.capacity",
                format!("backend `{backend_name}` must hold at least one entry"),
            ));
        }
        backends.insert(
            backend_name,
            CacheBackendConfig {
                capacity,
                instrumented: raw.instrumented.unwrap_or(defaults.instrumented),
            },
        );
    }
    backends
        .entry(DEFAULT_BACKEND.to_string())
        .or_insert_with(CacheBackendConfig::default);

    Ok(CacheSettings {
        name,
        warm_on_publish: cache.warm_on_publish.unwrap_or(true),
        backends,
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_to_memory_storage() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.uri, UriDefaults::default());
        assert_eq!(settings.cache.name, DEFAULT_CACHE_NAME);
        assert!(settings.cache.warm_on_publish);
        assert!(settings.cache.backends.contains_key(DEFAULT_BACKEND));
        assert_eq!(settings.database.max_connections.get(), 8);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());
        raw.cache.name = Some("djedi".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            cache_name: Some("hot".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.cache.name, "hot");
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let mut raw = RawSettings::default();
        raw.storage.backend = Some(StorageBackend::Postgres);

        let err = Settings::from_raw(raw.clone()).expect_err("missing url");
        assert!(matches!(err, LoadError::Invalid { key: "database.url", .. }));

        raw.database.url = Some("postgres://localhost/djedi".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);
    }

    #[test]
    fn blank_database_url_is_treated_as_absent() {
        let mut raw = RawSettings::default();
        raw.database.url = Some("   ".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn uri_defaults_are_validated() {
        let mut raw = RawSettings::default();
        raw.uri.language = Some("en-us".to_string());
        raw.uri.extension = Some("md".to_string());
        let settings = Settings::from_raw(raw.clone()).expect("valid settings");
        assert_eq!(settings.uri.language, "en-us");
        assert_eq!(settings.uri.extension, "md");
        assert_eq!(settings.uri.scheme, DEFAULT_SCHEME);

        raw.uri.extension = Some("tar.gz".to_string());
        let err = Settings::from_raw(raw).expect_err("reserved character");
        assert!(matches!(err, LoadError::Invalid { key: "uri.extension", .. }));
    }

    #[test]
    fn cache_backends_fill_defaults_and_reject_zero_capacity() {
        let mut raw = RawSettings::default();
        raw.cache.backends.insert(
            "hot".to_string(),
            RawCacheBackend {
                capacity: Some(16),
                instrumented: Some(true),
            },
        );
        let settings = Settings::from_raw(raw.clone()).expect("valid settings");
        let hot = &settings.cache.backends["hot"];
        assert_eq!(hot.capacity, 16);
        assert!(hot.instrumented);
        assert_eq!(
            settings.cache.backends[DEFAULT_BACKEND],
            CacheBackendConfig::default()
        );

        raw.cache.backends.insert(
            "cold".to_string(),
            RawCacheBackend {
                capacity: Some(0),
                instrumented: None,
            },
        );
        let err = Settings::from_raw(raw).expect_err("zero capacity");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "cache.backends.capacity",
                ..
            }
        ));
    }

    #[test]
    fn zero_graceful_shutdown_is_rejected() {
        let mut raw = RawSettings::default();
        raw.server.graceful_shutdown_seconds = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["djedi"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "djedi",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--database-url",
            "postgres://override",
            "--storage-backend",
            "postgres",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.database.database_url.as_deref(),
                    Some("postgres://override")
                );
                assert_eq!(
                    serve.overrides.storage_backend,
                    Some(StorageBackend::Postgres)
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_migrate_arguments() {
        let args = CliArgs::parse_from(["djedi", "migrate", "--database-url", "postgres://example"]);

        match args.command.expect("migrate command") {
            Command::Migrate(migrate) => {
                assert_eq!(
                    migrate.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
