//! Runtime configuration. Every setting is a CLI flag with an environment
//! fallback, so the service can be pointed at the clinical database the same
//! way the owning backend is.
//!
//! Host, port, name, user and password must match what the schema owner
//! deploys with; a mismatch surfaces as `SERVICE_UNAVAILABLE` on every field.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgConnectOptions;

pub const DEFAULT_CORS_ORIGINS: [&str; 2] = [
    "http://localhost:4200",
    "https://frontend-historial-clinico.vercel.app",
];

#[derive(Clone, Args)]
pub struct DbConfig {
    #[arg(id = "db-host", long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,
    #[arg(id = "db-port", long = "db-port", env = "DB_PORT", default_value_t = 5433)]
    pub port: u16,
    #[arg(id = "db-name", long = "db-name", env = "DB_NAME", default_value = "historialclinico")]
    pub name: String,
    #[arg(id = "db-user", long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,
    #[arg(
        id = "db-password",
        long = "db-password",
        env = "DB_PASSWORD",
        default_value = "password",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,
    /// Upper bound on pooled connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection before failing the field
    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

impl DbConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs.max(1))
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "BI_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "BI_PORT", default_value_t = 8001)]
    pub port: u16,
    /// Origins allowed to call the API with credentials
    #[arg(
        long = "cors-origin",
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_values = DEFAULT_CORS_ORIGINS
    )]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        db: DbConfig,
        #[command(flatten)]
        server: ServerConfig,
    }

    #[test]
    fn debug_output_redacts_password() {
        let cli = TestCli::parse_from(["bi-kpis", "--db-password", "hunter2"]);
        let rendered = format!("{:?}", cli.db);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn cors_origins_accept_comma_list() {
        let cli = TestCli::parse_from([
            "bi-kpis",
            "--cors-origin",
            "http://a.example,http://b.example",
        ]);
        assert_eq!(
            cli.server.cors_origins,
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
    }

    #[test]
    fn listen_addr_rejects_garbage() {
        let cli = TestCli::parse_from(["bi-kpis", "--host", "not a host"]);
        assert!(cli.server.listen_addr().is_err());
    }
}
