//! Configuration management for the MCP tool server.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::http::SsePaths;
use crate::mcp::protocol::ServerInfo;

/// Command-line arguments for the MCP tool server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-tool-server")]
#[command(author = "MCP Tool Server Team")]
#[command(about = "JSON-RPC 2.0 MCP server exposing registered tools over stdio, SSE or HTTP")]
#[command(disable_version_flag = true)]
pub struct Args {
    /// Transport mode
    #[arg(short, long, value_enum, default_value = "stdio", env = "MCP_TRANSPORT")]
    pub transport: Transport,

    /// Address to bind for HTTP transports
    #[arg(long, default_value = "127.0.0.1", env = "MCP_HOST")]
    pub host: String,

    /// Port for HTTP transports
    #[arg(short, long, default_value = "3000", env = "MCP_PORT")]
    pub port: u16,

    /// Server name reported on initialize
    #[arg(long, default_value = "mcp-tool-server")]
    pub name: String,

    /// Server version reported on initialize
    #[arg(long = "version", default_value = env!("CARGO_PKG_VERSION"))]
    pub server_version: String,

    /// Serve through the legacy adapter, degrading to tools-only when the
    /// extended capabilities cannot start
    #[arg(long)]
    pub legacy: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// YAML catalog of resources and prompts
    #[arg(long, env = "MCP_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Path of the SSE event stream
    #[arg(long, default_value = "/sse")]
    pub sse_path: String,

    /// Path clients post messages to
    #[arg(long, default_value = "/messages")]
    pub message_path: String,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[default]
    Stdio,
    Sse,
    StreamableHttp,
}

impl Transport {
    pub fn is_http(&self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transport mode
    pub transport: Transport,
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Name reported to clients
    pub name: String,
    /// Version reported to clients
    pub version: String,
    /// Serve through the legacy adapter
    pub legacy: bool,
    /// `-v` count
    pub verbosity: u8,
    /// Optional YAML catalog
    pub catalog: Option<PathBuf>,
    pub sse_path: String,
    pub message_path: String,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            transport: args.transport,
            host: args.host,
            port: args.port,
            name: args.name,
            version: args.server_version,
            legacy: args.legacy,
            verbosity: args.verbose,
            catalog: args.catalog,
            sse_path: args.sse_path,
            message_path: args.message_path,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: "127.0.0.1".to_string(),
            port: 3000,
            name: "mcp-tool-server".to_string(),
            version: crate::VERSION.to_string(),
            legacy: false,
            verbosity: 0,
            catalog: None,
            sse_path: "/sse".to_string(),
            message_path: "/messages".to_string(),
        }
    }
}

impl Config {
    /// Reject combinations the server cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.legacy && self.transport == Transport::StreamableHttp {
            return Err(Error::Config(
                "streamable-http is not supported in legacy mode".to_string(),
            ));
        }
        for path in [&self.sse_path, &self.message_path] {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("Route path must start with '/': {}", path)));
            }
        }
        if self.transport == Transport::Sse && self.sse_path == self.message_path {
            return Err(Error::Config(
                "SSE path and message path must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn sse_paths(&self) -> SsePaths {
        SsePaths {
            sse_path: self.sse_path.clone(),
            message_path: self.message_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["mcp-tool-server"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap().into()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_flags() {
        let config = parse(&[
            "--transport",
            "sse",
            "--port",
            "8123",
            "--name",
            "hr-tools",
            "--version",
            "2.1.0",
            "-vv",
            "--sse-path",
            "/events",
        ]);
        assert_eq!(config.transport, Transport::Sse);
        assert!(config.transport.is_http());
        assert_eq!(config.port, 8123);
        assert_eq!(config.server_info().name, "hr-tools");
        assert_eq!(config.server_info().version, "2.1.0");
        assert_eq!(config.verbosity, 2);
        assert_eq!(config.sse_paths().sse_path, "/events");
        assert_eq!(config.sse_paths().message_path, "/messages");
    }

    #[test]
    fn test_streamable_transport_name() {
        let config = parse(&["--transport", "streamable-http"]);
        assert_eq!(config.transport, Transport::StreamableHttp);
    }

    #[test]
    fn test_legacy_rejects_streamable_http() {
        let config = parse(&["--legacy", "--transport", "streamable-http"]);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = parse(&["--legacy", "--transport", "sse"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_paths() {
        let config = Config {
            sse_path: "events".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            transport: Transport::Sse,
            sse_path: "/same".to_string(),
            message_path: "/same".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
