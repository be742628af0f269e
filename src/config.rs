use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, anyhow};
use tracing::{info, warn};

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Firestore,
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sql" => Ok(Self::Sqlite),
            "firestore" | "firebase" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown chat backend {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub backend: BackendKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub firebase: Option<FirebaseConfig>,
    pub server_rate_limit: bool,
}

impl Config {
    /// Reads the server settings from the environment (and `.env`).
    pub fn load() -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL");
        let firebase = var("FIREBASE_PROJECT_ID").map(|project_id| FirebaseConfig {
            project_id,
            api_key: var("FIREBASE_API_KEY"),
            base_url: var("FIRESTORE_BASE_URL").unwrap_or_else(|| DEFAULT_FIRESTORE_URL.to_owned()),
        });

        let backend = match var("CHAT_BACKEND") {
            Some(kind) => kind.parse().map_err(|e: String| anyhow!(e))?,
            None if database_url.is_some() => BackendKind::Sqlite,
            None => {
                warn!("Neither CHAT_BACKEND nor DATABASE_URL set, keeping chat in memory");
                BackendKind::Memory
            }
        };

        match backend {
            BackendKind::Sqlite if database_url.is_none() => {
                return Err(anyhow!("CHAT_BACKEND=sqlite needs DATABASE_URL"));
            }
            BackendKind::Firestore => match &firebase {
                None => return Err(anyhow!("CHAT_BACKEND=firestore needs FIREBASE_PROJECT_ID")),
                Some(FirebaseConfig { api_key: None, .. }) => {
                    warn!("FIREBASE_API_KEY not set, requests go out unauthenticated");
                }
                Some(_) => {}
            },
            _ => {}
        }

        Ok(Self {
            bind_address: try_load("BIND_ADDRESS", "0.0.0.0")?,
            port: try_load("PORT", "8080")?,
            backend,
            database_url,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "16")?,
            firebase,
            server_rate_limit: try_load("SERVER_RATE_LIMIT", "false")?,
        })
    }
}

/// Settings of the terminal client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub room: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            server_url: try_load("MONADSSENGER_URL", "http://127.0.0.1:8080/api/")?,
            room: try_load("MONADSSENGER_ROOM", crate::db::DEFAULT_ROOM)?,
            timeout_secs: try_load("MONADSSENGER_TIMEOUT_SECS", "10")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    value
        .parse()
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value {value:?}"))
}
