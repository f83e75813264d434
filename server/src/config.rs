//! Environment-driven transport configuration.
//!
//! | variable              | effect                                    |
//! |-----------------------|-------------------------------------------|
//! | `GRPC_LISTEN_ADDRESS` | TCP host (default `127.0.0.1`)            |
//! | `GRPC_PORT`           | TCP port (default `8080`)                 |
//! | `GRPC_UNIX_SOCKET`    | serve on this UDS path instead of TCP     |

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub transport: Transport,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("GRPC_UNIX_SOCKET")
            && !path.is_empty()
        {
            return Ok(Self {
                transport: Transport::Unix {
                    path: PathBuf::from(path),
                },
            });
        }

        let host = std::env::var("GRPC_LISTEN_ADDRESS")
            .ok()
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
        let port = match std::env::var("GRPC_PORT") {
            Ok(raw) if !raw.is_empty() => raw
                .parse::<u16>()
                .with_context(|| format!("invalid GRPC_PORT {raw:?}"))?,
            _ => DEFAULT_PORT,
        };
        Ok(Self {
            transport: Transport::Tcp { host, port },
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<Option<SocketAddr>> {
        match &self.transport {
            Transport::Tcp { host, port } => {
                let addr = format!("{host}:{port}")
                    .parse::<SocketAddr>()
                    .with_context(|| format!("invalid listen address {host}:{port}"))?;
                Ok(Some(addr))
            }
            Transport::Unix { .. } => Ok(None),
        }
    }
}
