use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use prost::Message;
use riemlog_core::config::TransportKind;

use super::{Ack, Transport, TransportError, resolve};
use crate::proto::Msg;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// Fire-and-forget datagram transport. One encoded `Msg` per datagram.
pub struct UdpTransport {
    addr: String,
    session: Option<(UdpSocket, SocketAddr)>,
}

impl UdpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        let target = resolve(&self.addr)?[0];
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        self.session = Some((socket, target));
        Ok(())
    }

    fn send(&mut self, msg: &Msg) -> Result<Ack, TransportError> {
        let Some((socket, target)) = self.session.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        let body = msg.encode_to_vec();
        if body.len() > MAX_DATAGRAM {
            return Err(TransportError::Protocol(format!(
                "message of {} bytes does not fit in a datagram",
                body.len()
            )));
        }
        socket.send_to(&body, target)?;
        Ok(Ack::Unacknowledged)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.session = None;
        Ok(())
    }
}
