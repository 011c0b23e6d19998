use std::net::SocketAddr;
use std::time::Duration;
use clap::Parser;

/// Runtime settings for the HTTP server. Every flag can also come from the
/// environment (or a `.env` file loaded at startup).
#[derive(Debug, Clone, Parser)]
#[command(name = "tictactoe-server", version, about = "Room-based tic-tac-toe over HTTP")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "TTT_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// SQLite database file. Rooms live in memory when omitted.
    #[arg(long, env = "TTT_DATABASE")]
    pub database: Option<String>,

    /// Comma separated origins allowed by CORS.
    #[arg(
        long,
        env = "TTT_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:8080"
    )]
    pub allowed_origins: Vec<String>,

    /// How long decided or abandoned rooms are kept before their codes are reused.
    #[arg(long, env = "TTT_RETENTION_SECS", default_value_t = 86_400)]
    pub retention_secs: u64,

    #[arg(long, env = "TTT_PURGE_INTERVAL_SECS", default_value_t = 300)]
    pub purge_interval_secs: u64,
}

impl ServerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Never zero, since a zero period would make the purge ticker panic.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            retention_secs: 86_400,
            purge_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Declared default of a flag, read from the command definition so no
    /// `TTT_*` variable in the environment can leak in.
    fn declared_default(name: &str) -> Option<String> {
        let command = ServerConfig::command();
        let arg = command.get_arguments().find(|arg| arg.get_id() == name)?;
        let values: Vec<String> = arg
            .get_default_values()
            .iter()
            .map(|v| v.to_string_lossy().into_owned())
            .collect();
        (!values.is_empty()).then(|| values.join(","))
    }

    #[test]
    fn defaults_match_parser_defaults() {
        let defaults = ServerConfig::default();
        assert_eq!(declared_default("bind"), Some(defaults.bind.to_string()));
        assert_eq!(declared_default("database"), None);
        assert_eq!(declared_default("allowed_origins"), Some(defaults.allowed_origins.join(",")));
        assert_eq!(declared_default("retention_secs"), Some(defaults.retention_secs.to_string()));
        assert_eq!(declared_default("purge_interval_secs"), Some(defaults.purge_interval_secs.to_string()));
        assert_eq!(defaults.retention(), Duration::from_secs(86_400));
    }

    #[test]
    fn flags_override_defaults() {
        let parsed = ServerConfig::try_parse_from([
            "tictactoe-server",
            "--bind",
            "127.0.0.1:9000",
            "--database",
            "rooms.db",
            "--allowed-origins",
            "https://a.example,https://b.example",
            "--purge-interval-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(parsed.bind.port(), 9000);
        assert_eq!(parsed.database.as_deref(), Some("rooms.db"));
        assert_eq!(parsed.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(parsed.purge_interval(), Duration::from_secs(1));
    }
}
