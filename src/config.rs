use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::{path::PathBuf, sync::LazyLock};
use url::Url;

/// Placeholder value shipped in the setup docs; treated the same as unset.
const REFRESH_TOKEN_PLACEHOLDER: &str = "your-google-oauth-refresh-token";

const DEFAULT_CONFIG_FILE: &str = "config.toml";

pub static GOOGLE_TOKEN_URI: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://oauth2.googleapis.com/token").expect("valid Google token URI")
});
pub static DRIVE_FILES_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://www.googleapis.com/drive/v3/files").expect("valid Drive files URL")
});
pub static DRIVE_UPLOAD_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://www.googleapis.com/upload/drive/v3/files").expect("valid Drive upload URL")
});
pub static DRIVE_ABOUT_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://www.googleapis.com/drive/v3/about").expect("valid Drive about URL")
});

/// Application configuration managed by Figment.
///
/// Merge order: struct defaults, then an optional `config.toml`, then raw
/// environment variables (the primary channel for deployments).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Google OAuth2 client id. Env: `CLIENT_ID`.
    #[serde(default)]
    pub client_id: String,

    /// Google OAuth2 client secret. Env: `CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: String,

    /// Registered OAuth2 redirect URI. Env: `REDIRECT_URI`.
    /// The refresh grant itself never redirects; this is kept on the client
    /// so the credential set stays whole.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Long-lived refresh credential for the single Drive identity the whole
    /// service acts as. Env: `REFRESH_TOKEN`.
    #[serde(default)]
    pub refresh_token: String,

    /// Login username for the session gate. Env: `AUTH_USERNAME`.
    #[serde(default = "default_auth_username")]
    pub auth_username: String,

    /// Login password for the session gate. Env: `AUTH_PASSWORD`.
    #[serde(default = "default_auth_password")]
    pub auth_password: String,

    /// Session-cookie key material (at least 32 bytes). A random per-process
    /// key is generated when unset. Env: `SECRET_KEY`.
    #[serde(default)]
    pub secret_key: String,

    /// HTTP server listen address. Env: `LISTEN_ADDR`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port. Env: `LISTEN_PORT` (or `PORT`). Default: `5000`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Ceiling for server-side copies, in bytes. Env: `MAX_FILE_SIZE`.
    /// Default: 30 GiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Read-buffer granularity for spool streaming, in bytes. Env: `CHUNK_SIZE`.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Log level for tracing subscriber initialization. Env: `LOGLEVEL`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// How many background transfer jobs may run at once. Env: `WORKER_CONCURRENCY`.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// How long finished task records stay pollable, in seconds.
    /// Env: `TASK_RETENTION_SECS`. Default: one hour.
    #[serde(default = "default_task_retention_secs")]
    pub task_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            refresh_token: String::new(),
            auth_username: default_auth_username(),
            auth_password: default_auth_password(),
            secret_key: String::new(),
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            loglevel: default_loglevel(),
            worker_concurrency: default_worker_concurrency(),
            task_retention_secs: default_task_retention_secs(),
        }
    }
}

impl Config {
    /// Builds a Figment merging defaults, an optional config TOML file, and
    /// the environment.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment
            .merge(Env::raw().only(&[
                "client_id",
                "client_secret",
                "redirect_uri",
                "refresh_token",
                "auth_username",
                "auth_password",
                "secret_key",
                "listen_addr",
                "listen_port",
                "max_file_size",
                "chunk_size",
                "loglevel",
                "worker_concurrency",
                "task_retention_secs",
            ]))
            .merge(Env::raw().only(&["port"]).map(|_| "listen_port".into()))
    }

    /// Loads configuration from defaults, `config.toml` if present, and the
    /// environment.
    pub fn from_env() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml + env): {err}")
        })
    }

    /// The configured refresh token, unless unset or left at the placeholder.
    pub fn refresh_credential(&self) -> Option<&str> {
        let token = self.refresh_token.trim();
        (!token.is_empty() && token != REFRESH_TOKEN_PLACEHOLDER).then_some(token)
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_env);

fn default_redirect_uri() -> String {
    "http://localhost:3000/oauth2callback".to_string()
}

fn default_auth_username() -> String {
    "admin".to_string()
}

fn default_auth_password() -> String {
    "secure123".to_string()
}

fn default_listen_addr() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

fn default_listen_port() -> u16 {
    5000
}

fn default_max_file_size() -> u64 {
    30 * 1024 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    8192
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_task_retention_secs() -> u64 {
    3600
}
