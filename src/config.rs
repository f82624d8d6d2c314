use std::time::Duration;

use clap::Args;

use crate::store::WaitPolicy;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 50051;

/// Server settings
#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Binding address host(e.g. 0.0.0.0, localhost)
    #[arg(long, env = "KVS_SERVER_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
    /// Binding address port, 0 picks a free one
    #[arg(long, env = "KVS_SERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// How long a get waits for an absent key when the caller gives no budget
    #[arg(long, env = "KVS_WAIT_BUDGET_MS", default_value_t = 3000)]
    pub wait_budget_ms: u64,
    /// Upper bound on any get wait budget
    #[arg(long, env = "KVS_MAX_WAIT_MS", default_value_t = 600_000)]
    pub max_wait_ms: u64,
    /// Max concurrent connections
    #[arg(long, env = "KVS_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: usize,
    /// Max concurrent connections from one ip
    #[arg(long, env = "KVS_MAX_CONNECTIONS_PER_IP", default_value_t = 10)]
    pub max_connections_per_ip: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            wait_budget_ms: 3000,
            max_wait_ms: 600_000,
            max_connections: 10,
            max_connections_per_ip: 10,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            default_wait: Duration::from_millis(self.wait_budget_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

/// Client settings
#[derive(Args, Debug, Clone)]
pub struct ClientConfig {
    /// Remote server host
    #[arg(long, env = "KVS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
    /// Remote server port
    #[arg(long, env = "KVS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Timeout for establishing the connection
    #[arg(long, env = "KVS_CONNECTION_TIMEOUT_MS", default_value_t = 3000)]
    pub connection_timeout_ms: u64,
    /// Default timeout for get and set
    #[arg(long, env = "KVS_TIMEOUT_MS", default_value_t = 3000)]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            connection_timeout_ms: 3000,
            timeout_ms: 3000,
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        server: ServerConfig,
    }

    #[test]
    fn flag_defaults_match_default_impl() {
        let parsed = Cli::try_parse_from(["kv-server"]).unwrap().server;
        let default = ServerConfig::default();
        assert_eq!(parsed.port, default.port);
        assert_eq!(parsed.wait_budget_ms, default.wait_budget_ms);
        assert_eq!(parsed.max_connections, default.max_connections);
    }

    #[test]
    fn flags_override() {
        let parsed = Cli::try_parse_from(["kv-server", "--port", "0", "--wait-budget-ms", "100"])
            .unwrap()
            .server;
        assert_eq!(parsed.addr(), "localhost:0");
        assert_eq!(parsed.wait_policy().default_wait, Duration::from_millis(100));
    }
}
