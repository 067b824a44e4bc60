use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use riemlog_core::config::{Config, TransportKind};
use thiserror::Error;

use crate::proto::Msg;

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("could not resolve collector address {0}")]
    Resolve(String),

    #[error("failed to decode reply: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// What the collector said about a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Connectionless send; nothing comes back.
    Unacknowledged,
    Acknowledged { ok: bool, error: Option<String> },
}

/// A session with the collector. Implementations are driven by one caller at
/// a time; the forwarder serialises access.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    fn connect(&mut self) -> Result<(), TransportError>;

    fn send(&mut self, msg: &Msg) -> Result<Ack, TransportError>;

    /// Must succeed on a handle that is already disconnected.
    fn disconnect(&mut self) -> Result<(), TransportError>;

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.disconnect()?;
        self.connect()
    }
}

pub fn build_transport(cfg: &Config) -> Box<dyn Transport> {
    match cfg.transport {
        TransportKind::Udp => Box::new(UdpTransport::new(cfg.collector_addr())),
        TransportKind::Tcp => Box::new(TcpTransport::new(
            cfg.collector_addr(),
            cfg.connect_timeout,
            cfg.io_timeout,
        )),
    }
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>, TransportError> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve(format!("{addr}: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Resolve(addr.to_string()));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_transport_follows_config() {
        let mut cfg = Config::default();
        assert_eq!(build_transport(&cfg).kind(), TransportKind::Udp);
        cfg.transport = TransportKind::Tcp;
        assert_eq!(build_transport(&cfg).kind(), TransportKind::Tcp);
    }

    #[test]
    fn resolve_rejects_garbage() {
        assert!(resolve("not an address").is_err());
        assert!(!resolve("127.0.0.1:5555").unwrap().is_empty());
    }
}
