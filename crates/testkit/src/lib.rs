use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prost::Message;
use riemlog_core::config::{Config, TransportKind};
use riemlog_core::model::record::{LogRecord, ThrowableInfo};
use riemlog_core::severity::Severity;
use riemlog_forward::proto::{Event, Msg};
use riemlog_forward::transport::{Ack, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;

pub fn sample_config() -> Config {
    Config {
        service_name: "billing".to_string(),
        hostname: "web-1".to_string(),
        ..Config::default()
    }
}

pub fn sample_error_record() -> LogRecord {
    LogRecord::new(Severity::Error, "payment failed")
        .with_logger("billing.api.ChargeController")
        .with_thread("http-worker-3")
        .with_timestamp_millis(1_769_904_000_250)
        .with_throwable(ThrowableInfo {
            class_name: "java.lang.RuntimeException".to_string(),
            message: "boom".to_string(),
            frames: vec![
                "at billing.api.ChargeController.charge(ChargeController.java:88)".to_string(),
                "at billing.api.Router.dispatch(Router.java:31)".to_string(),
            ],
        })
        .with_marker("PAYMENTS")
        .with_context("user", "alice")
        .with_context("request_id", "r-42")
}

pub fn sample_info_record() -> LogRecord {
    LogRecord::new(Severity::Info, "payment accepted")
        .with_logger("billing.api.ChargeController")
        .with_thread("http-worker-1")
        .with_timestamp_millis(1_769_904_001_000)
}

/// Counts of calls made against a [`ScriptedTransport`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportCalls {
    pub connects: usize,
    pub sends: usize,
    pub reconnects: usize,
    pub disconnects: usize,
}

/// A transport whose replies are queued up front. Once the queue is empty
/// every send succeeds.
pub struct ScriptedTransport {
    kind: TransportKind,
    replies: VecDeque<Result<Ack, TransportError>>,
    calls: Arc<Mutex<TransportCalls>>,
    sent: Arc<Mutex<Vec<Msg>>>,
    refuse_connect: bool,
}

#[derive(Clone)]
pub struct ScriptHandle {
    calls: Arc<Mutex<TransportCalls>>,
    sent: Arc<Mutex<Vec<Msg>>>,
}

impl ScriptHandle {
    pub fn calls(&self) -> TransportCalls {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn sent_events(&self) -> Vec<Event> {
        self.sent
            .lock()
            .map(|s| s.iter().flat_map(|m| m.events.clone()).collect())
            .unwrap_or_default()
    }
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind) -> (Self, ScriptHandle) {
        let calls = Arc::new(Mutex::new(TransportCalls::default()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                kind,
                replies: VecDeque::new(),
                calls: calls.clone(),
                sent: sent.clone(),
                refuse_connect: false,
            },
            ScriptHandle { calls, sent },
        )
    }

    pub fn then_io_error(mut self) -> Self {
        self.replies.push_back(Err(TransportError::Io(io::Error::from(
            io::ErrorKind::BrokenPipe,
        ))));
        self
    }

    pub fn then_reject(mut self, error: &str) -> Self {
        self.replies.push_back(Ok(Ack::Acknowledged {
            ok: false,
            error: Some(error.to_string()),
        }));
        self
    }

    pub fn always_failing(mut self) -> Self {
        for _ in 0..64 {
            self = self.then_io_error();
        }
        self
    }

    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    fn success(&self) -> Ack {
        match self.kind {
            TransportKind::Udp => Ack::Unacknowledged,
            TransportKind::Tcp => Ack::Acknowledged {
                ok: true,
                error: None,
            },
        }
    }

    fn record<F: FnOnce(&mut TransportCalls)>(&self, f: F) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        self.record(|c| c.connects += 1);
        if self.refuse_connect {
            return Err(TransportError::Io(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            )));
        }
        Ok(())
    }

    fn send(&mut self, msg: &Msg) -> Result<Ack, TransportError> {
        self.record(|c| c.sends += 1);
        let reply = self.replies.pop_front().unwrap_or_else(|| Ok(self.success()));
        if let Ok(Ack::Unacknowledged | Ack::Acknowledged { ok: true, .. }) = &reply
            && let Ok(mut sent) = self.sent.lock()
        {
            sent.push(msg.clone());
        }
        reply
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(|c| c.disconnects += 1);
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.record(|c| c.reconnects += 1);
        self.disconnect()?;
        self.connect()
    }
}

/// How a [`FakeCollector`] answers TCP frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpReplies {
    AlwaysOk,
    /// Reply `ok=false` to the first `n` frames.
    RejectFirst(usize),
    /// Close the first connection after reading one frame, without replying.
    DropFirstConnection,
}

/// An in-process Riemann collector listening on an ephemeral localhost port.
pub struct FakeCollector {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<Event>,
    connections: Arc<AtomicUsize>,
}

impl FakeCollector {
    pub async fn udp() -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];
            while let Ok((n, _)) = socket.recv_from(&mut buf).await {
                if let Ok(msg) = Msg::decode(&buf[..n]) {
                    for event in msg.events {
                        let _ = tx.send(event);
                    }
                }
            }
        });
        Ok(Self {
            addr,
            events: rx,
            connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub async fn tcp(replies: TcpReplies) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(AtomicUsize::new(0));
        let conn_count = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let nth = conn_count.fetch_add(1, Ordering::SeqCst);
                let drop_after_read = replies == TcpReplies::DropFirstConnection && nth == 0;
                tokio::spawn(serve_tcp(
                    stream,
                    tx.clone(),
                    frames.clone(),
                    replies,
                    drop_after_read,
                ));
            }
        });
        Ok(Self {
            addr,
            events: rx,
            connections,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self, transport: TransportKind) -> Config {
        Config {
            collector_host: self.addr.ip().to_string(),
            collector_port: self.addr.port(),
            transport,
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
            ..sample_config()
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn next_event(&mut self, wait: Duration) -> Option<Event> {
        tokio::time::timeout(wait, self.events.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn serve_tcp(
    mut stream: TcpStream,
    tx: mpsc::UnboundedSender<Event>,
    frames: Arc<AtomicUsize>,
    replies: TcpReplies,
    drop_after_read: bool,
) {
    loop {
        let Ok(len) = stream.read_u32().await else {
            return;
        };
        let mut body = vec![0u8; len as usize];
        if stream.read_exact(&mut body).await.is_err() {
            return;
        }
        if drop_after_read {
            return;
        }
        let Ok(msg) = Msg::decode(body.as_slice()) else {
            return;
        };

        let nth = frames.fetch_add(1, Ordering::SeqCst);
        let reply = match replies {
            TcpReplies::RejectFirst(n) if nth < n => Msg::nack("collector overloaded"),
            _ => {
                for event in msg.events {
                    let _ = tx.send(event);
                }
                Msg::ack()
            }
        };
        let out = reply.encode_to_vec();
        if stream.write_u32(out.len() as u32).await.is_err()
            || stream.write_all(&out).await.is_err()
        {
            return;
        }
    }
}
