use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use riemlog_core::config::Config;
use riemlog_core::model::record::LogRecord;
use riemlog_core::severity::Severity;
use thiserror::Error;
use tracing::{info, warn};

use crate::builder::build_event;
use crate::counter::ForwardCounter;
use crate::engine::{DeliveryEngine, DeliveryError};
use crate::filter::should_forward;
use crate::transport::{Ack, Transport, TransportError, build_transport};

#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("failed to connect to collector {collector}: {source}")]
    ConnectionSetup {
        collector: String,
        #[source]
        source: TransportError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Below the minimum severity; nothing was built or sent.
    Filtered,
    /// The forwarder has not been started or has been stopped.
    NotRunning,
    Delivered(Ack),
}

struct State {
    engine: DeliveryEngine,
    running: bool,
}

/// Entry point the host logging framework drives.
///
/// `forward` runs on the calling thread. Filter, build, send and retry happen
/// under one lock, so concurrent callers are serialised on the transport.
pub struct Forwarder {
    cfg: Config,
    minimum: AtomicU8,
    counter: ForwardCounter,
    state: Mutex<State>,
}

impl Forwarder {
    pub fn new(cfg: Config) -> Self {
        let transport = build_transport(&cfg);
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: Config, transport: Box<dyn Transport>) -> Self {
        let engine = DeliveryEngine::new(transport, cfg.max_attempts, cfg.debug);
        Self {
            minimum: AtomicU8::new(cfg.minimum_severity.as_u8()),
            counter: ForwardCounter::new(),
            state: Mutex::new(State {
                engine,
                running: false,
            }),
            cfg,
        }
    }

    pub fn with_counter(mut self, counter: ForwardCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn times_called(&self) -> u64 {
        self.counter.get()
    }

    pub fn minimum_severity(&self) -> Severity {
        Severity::from_u8(self.minimum.load(Ordering::Relaxed)).unwrap_or(Severity::Error)
    }

    pub fn set_minimum_severity(&self, severity: Severity) {
        self.minimum.store(severity.as_u8(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Connects to the collector. A failure here is fatal for the forwarder.
    pub fn on_start(&self) -> Result<(), ForwarderError> {
        if self.cfg.debug {
            info!(forwarder = %self, "starting");
        }
        let mut state = self.lock();
        state
            .engine
            .connect()
            .map_err(|source| ForwarderError::ConnectionSetup {
                collector: self.cfg.collector_addr(),
                source,
            })?;
        state.running = true;
        info!(
            collector = %self.cfg.collector_addr(),
            transport = %self.cfg.transport,
            hostname = %self.cfg.hostname,
            "connected to collector"
        );
        Ok(())
    }

    /// Best-effort disconnect. Never fails, including on a forwarder that was
    /// never started or is already stopped.
    pub fn on_stop(&self) {
        if self.cfg.debug {
            info!(forwarder = %self, "stopping");
        }
        let mut state = self.lock();
        if let Err(e) = state.engine.disconnect()
            && self.cfg.debug
        {
            warn!(error = %e, "ignored error while disconnecting");
        }
        state.running = false;
    }

    /// Forwards one record. Delivery failures are logged when debug is on
    /// and otherwise dropped; they never reach the caller.
    pub fn forward(&self, record: &LogRecord) {
        if let Err(e) = self.try_forward(record)
            && self.cfg.debug
        {
            warn!(error = %e, "dropped log event after retries");
        }
    }

    /// Like [`Forwarder::forward`] but reports the result.
    pub fn try_forward(&self, record: &LogRecord) -> Result<ForwardOutcome, DeliveryError> {
        self.counter.increment();
        let mut state = self.lock();

        if !should_forward(record, self.minimum_severity()) {
            return Ok(ForwardOutcome::Filtered);
        }
        if !state.running {
            return Ok(ForwardOutcome::NotRunning);
        }

        let event = build_event(record, &self.cfg);
        if self.cfg.debug {
            info!(?event, "sending event");
        }
        state.engine.deliver(&event).map(ForwardOutcome::Delivered)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the transport usable; the
        // next attempt reconnects if it is not.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Display for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Forwarder{{service={};transport={};collector={};hostname={}}}",
            self.cfg.service_name,
            self.cfg.transport,
            self.cfg.collector_addr(),
            self.cfg.hostname
        )
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = state.engine.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use riemlog_core::config::TransportKind;
    use tracing_test::traced_test;

    use super::*;
    use crate::proto::Msg;

    #[derive(Default)]
    struct Log {
        connects: usize,
        disconnects: usize,
        sent: Vec<Msg>,
    }

    struct Recording {
        log: Arc<StdMutex<Log>>,
        refuse_connect: bool,
        fail_sends: bool,
    }

    impl Recording {
        fn new() -> (Self, Arc<StdMutex<Log>>) {
            let log = Arc::new(StdMutex::new(Log::default()));
            (
                Self {
                    log: log.clone(),
                    refuse_connect: false,
                    fail_sends: false,
                },
                log,
            )
        }
    }

    impl Transport for Recording {
        fn kind(&self) -> TransportKind {
            TransportKind::Udp
        }

        fn connect(&mut self) -> Result<(), TransportError> {
            if self.refuse_connect {
                return Err(TransportError::Io(std::io::Error::from(
                    std::io::ErrorKind::ConnectionRefused,
                )));
            }
            self.log.lock().unwrap().connects += 1;
            Ok(())
        }

        fn send(&mut self, msg: &Msg) -> Result<Ack, TransportError> {
            if self.fail_sends {
                return Err(TransportError::NotConnected);
            }
            self.log.lock().unwrap().sent.push(msg.clone());
            Ok(Ack::Unacknowledged)
        }

        fn disconnect(&mut self) -> Result<(), TransportError> {
            self.log.lock().unwrap().disconnects += 1;
            Ok(())
        }
    }

    fn cfg() -> Config {
        Config {
            service_name: "billing".into(),
            hostname: "web-1".into(),
            ..Config::default()
        }
    }

    #[test]
    fn filtered_records_are_counted_but_not_sent() {
        let (transport, log) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));
        fwd.on_start().unwrap();

        let outcome = fwd
            .try_forward(&LogRecord::new(Severity::Info, "hello"))
            .unwrap();

        assert_eq!(outcome, ForwardOutcome::Filtered);
        assert_eq!(fwd.times_called(), 1);
        assert!(log.lock().unwrap().sent.is_empty());
    }

    #[test]
    fn minimum_severity_change_applies_to_next_record() {
        let (transport, log) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));
        fwd.on_start().unwrap();
        let info = LogRecord::new(Severity::Info, "hello");

        fwd.forward(&info);
        fwd.set_minimum_severity(Severity::Info);
        fwd.forward(&info);

        assert_eq!(fwd.minimum_severity(), Severity::Info);
        assert_eq!(fwd.times_called(), 2);
        assert_eq!(log.lock().unwrap().sent.len(), 1);
    }

    #[test]
    fn delivered_event_carries_record_fields() {
        let (transport, log) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));
        fwd.on_start().unwrap();

        fwd.forward(&LogRecord::new(Severity::Error, "boom").with_context("user", "alice"));

        let log = log.lock().unwrap();
        let event = &log.sent[0].events[0];
        assert_eq!(event.host.as_deref(), Some("web-1"));
        assert_eq!(event.description.as_deref(), Some("boom"));
        assert!(
            event
                .attributes
                .iter()
                .any(|a| a.key == "log/user" && a.value.as_deref() == Some("alice"))
        );
    }

    #[test]
    fn start_failure_is_connection_setup_error() {
        let (mut transport, _) = Recording::new();
        transport.refuse_connect = true;
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));

        let err = fwd.on_start().unwrap_err();

        assert!(matches!(err, ForwarderError::ConnectionSetup { .. }));
        assert!(!fwd.is_running());
    }

    #[test]
    fn forward_swallows_delivery_failures() {
        let (mut transport, _) = Recording::new();
        transport.fail_sends = true;
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));
        fwd.on_start().unwrap();
        let rec = LogRecord::new(Severity::Error, "boom");

        fwd.forward(&rec);

        assert!(fwd.try_forward(&rec).is_err());
        assert_eq!(fwd.times_called(), 2);
    }

    #[test]
    fn records_before_start_are_dropped() {
        let (transport, log) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));

        let outcome = fwd
            .try_forward(&LogRecord::new(Severity::Error, "early"))
            .unwrap();

        assert_eq!(outcome, ForwardOutcome::NotRunning);
        assert!(log.lock().unwrap().sent.is_empty());
    }

    #[test]
    fn stop_is_safe_in_any_state() {
        let (transport, log) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));

        fwd.on_stop();
        fwd.on_start().unwrap();
        fwd.on_stop();
        fwd.on_stop();

        assert!(!fwd.is_running());
        assert_eq!(log.lock().unwrap().connects, 1);
    }

    #[test]
    fn counter_can_be_injected() {
        let counter = ForwardCounter::new();
        let (transport, _) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport)).with_counter(counter.clone());

        fwd.forward(&LogRecord::new(Severity::Debug, "x"));

        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn display_names_collector() {
        let (transport, _) = Recording::new();
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));
        assert_eq!(
            fwd.to_string(),
            "Forwarder{service=billing;transport=udp;collector=localhost:5555;hostname=web-1}"
        );
    }

    #[test]
    #[traced_test]
    fn debug_mode_reports_dropped_events() {
        let (mut transport, _) = Recording::new();
        transport.fail_sends = true;
        let mut cfg = cfg();
        cfg.debug = true;
        let fwd = Forwarder::with_transport(cfg, Box::new(transport));
        fwd.on_start().unwrap();

        fwd.forward(&LogRecord::new(Severity::Error, "boom"));

        assert!(logs_contain("dropped log event after retries"));
    }

    #[test]
    #[traced_test]
    fn quiet_mode_drops_silently() {
        let (mut transport, _) = Recording::new();
        transport.fail_sends = true;
        let fwd = Forwarder::with_transport(cfg(), Box::new(transport));
        fwd.on_start().unwrap();

        fwd.forward(&LogRecord::new(Severity::Error, "boom"));

        assert!(!logs_contain("dropped log event after retries"));
        assert!(!logs_contain("error sending event"));
    }
}
