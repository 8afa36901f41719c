// src/config.rs

use clap::Parser;
use std::net::SocketAddr;

use crate::{error::ServerError, uploads::DEFAULT_MAX_UPLOAD_BYTES};

/// Real-time room chat server
#[derive(Parser, Clone, Debug)]
#[command(name = "room-chat-server", version, about = "Real-time room chat server")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "CHAT_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Directory uploaded attachments are written to
    #[arg(long, env = "CHAT_UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: String,

    /// Base URL used in attachment download links
    #[arg(long, env = "CHAT_PUBLIC_URL", default_value = "http://localhost:5000")]
    pub public_url: String,

    /// Largest accepted upload
    #[arg(long, env = "CHAT_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        self.bind.parse().map_err(|_| ServerError::InvalidBindAddress(self.bind.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::parse_from(["room-chat-server"]);
        assert_eq!(config.bind_addr().unwrap().port(), 5000);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload_dir, "./uploads");
    }

    #[test]
    fn bad_bind_address_is_reported() {
        let config = Config::parse_from(["room-chat-server", "--bind", "not-an-address"]);
        assert!(matches!(config.bind_addr(), Err(ServerError::InvalidBindAddress(addr)) if addr == "not-an-address"));
    }
}
