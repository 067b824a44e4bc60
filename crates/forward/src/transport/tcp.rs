use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use prost::Message;
use riemlog_core::config::TransportKind;

use super::{Ack, Transport, TransportError, resolve};
use crate::proto::Msg;

/// Upper bound on a reply frame; anything larger means the stream is out of
/// sync.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

/// Session transport. Each message is written as a 4-byte big-endian length
/// followed by the encoded `Msg`, and the collector answers with a frame of
/// the same shape.
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            io_timeout,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        let mut last_err = None;
        for addr in resolve(&self.addr)? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout))?;
                    stream.set_write_timeout(Some(self.io_timeout))?;
                    stream.set_nodelay(true)?;
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(TransportError::Io)
            .unwrap_or_else(|| TransportError::Resolve(self.addr.clone())))
    }

    fn send(&mut self, msg: &Msg) -> Result<Ack, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        write_frame(stream, msg)?;
        let reply = read_frame(stream)?;
        Ok(Ack::Acknowledged {
            ok: reply.ok.unwrap_or(false),
            error: reply.error,
        })
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            // The peer may already have closed the socket.
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }
}

pub fn write_frame<W: Write>(w: &mut W, msg: &Msg) -> Result<(), TransportError> {
    let body = msg.encode_to_vec();
    let len = u32::try_from(body.len())
        .map_err(|_| TransportError::Protocol(format!("message too large: {}", body.len())))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

pub fn read_frame<R: Read>(r: &mut R) -> Result<Msg, TransportError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME {
        return Err(TransportError::Protocol(format!(
            "reply frame of {len} bytes exceeds limit"
        )));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(Msg::decode(body.as_slice())?)
}
