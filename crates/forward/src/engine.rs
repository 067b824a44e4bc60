use riemlog_core::config::TransportKind;
use riemlog_core::model::event::MonitoringEvent;
use thiserror::Error;
use tracing::{debug, warn};

use crate::proto::Msg;
use crate::transport::{Ack, Transport, TransportError};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("collector rejected event: {0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },
}

/// Sends events over one transport session, reconnecting between attempts.
///
/// The first attempt reuses the current session. Each later attempt tears
/// the session down and re-establishes it before sending. A negative
/// acknowledgement counts as a failed attempt.
pub struct DeliveryEngine {
    transport: Box<dyn Transport>,
    max_attempts: u32,
    debug: bool,
}

impl DeliveryEngine {
    pub fn new(transport: Box<dyn Transport>, max_attempts: u32, debug: bool) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
            debug,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) -> Result<(), TransportError> {
        self.transport.disconnect()
    }

    pub fn deliver(&mut self, event: &MonitoringEvent) -> Result<Ack, DeliveryError> {
        let msg = Msg::from_event(event);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = if attempt > 1 {
                self.transport
                    .reconnect()
                    .map_err(DeliveryError::from)
                    .and_then(|()| self.send_once(&msg))
            } else {
                self.send_once(&msg)
            };

            match result {
                Ok(ack) => {
                    if self.debug {
                        debug!(attempt, kind = %self.kind(), "event sent to collector");
                    }
                    return Ok(ack);
                }
                Err(err) => {
                    if self.debug {
                        warn!(attempt, error = %err, "error sending event");
                    }
                    if attempt >= self.max_attempts {
                        return Err(DeliveryError::Exhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                }
            }
        }
    }

    fn send_once(&mut self, msg: &Msg) -> Result<Ack, DeliveryError> {
        match self.transport.send(msg)? {
            Ack::Acknowledged { ok: false, error } => Err(DeliveryError::Rejected(
                error.unwrap_or_else(|| "no error message".to_string()),
            )),
            ack => Ok(ack),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Calls {
        sends: usize,
        reconnects: usize,
    }

    struct Scripted {
        replies: VecDeque<Result<Ack, TransportError>>,
        calls: Arc<Mutex<Calls>>,
        fail_reconnect: bool,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Ack, TransportError>>) -> (Self, Arc<Mutex<Calls>>) {
            let calls = Arc::new(Mutex::new(Calls::default()));
            (
                Self {
                    replies: replies.into(),
                    calls: calls.clone(),
                    fail_reconnect: false,
                },
                calls,
            )
        }
    }

    impl Transport for Scripted {
        fn kind(&self) -> TransportKind {
            TransportKind::Tcp
        }

        fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(&mut self, _msg: &Msg) -> Result<Ack, TransportError> {
            self.calls.lock().unwrap().sends += 1;
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::NotConnected))
        }

        fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn reconnect(&mut self) -> Result<(), TransportError> {
            self.calls.lock().unwrap().reconnects += 1;
            if self.fail_reconnect {
                return Err(TransportError::Io(io::Error::from(
                    io::ErrorKind::ConnectionRefused,
                )));
            }
            Ok(())
        }
    }

    fn ok_ack() -> Result<Ack, TransportError> {
        Ok(Ack::Acknowledged {
            ok: true,
            error: None,
        })
    }

    fn io_err() -> Result<Ack, TransportError> {
        Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    #[test]
    fn first_send_success_does_not_reconnect() {
        let (transport, calls) = Scripted::new(vec![ok_ack()]);
        let mut engine = DeliveryEngine::new(Box::new(transport), 2, false);

        assert!(engine.deliver(&MonitoringEvent::default()).is_ok());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.sends, 1);
        assert_eq!(calls.reconnects, 0);
    }

    #[test]
    fn retries_once_after_reconnect() {
        let (transport, calls) = Scripted::new(vec![io_err(), ok_ack()]);
        let mut engine = DeliveryEngine::new(Box::new(transport), 2, false);

        let ack = engine.deliver(&MonitoringEvent::default()).unwrap();

        assert_eq!(
            ack,
            Ack::Acknowledged {
                ok: true,
                error: None
            }
        );
        let calls = calls.lock().unwrap();
        assert_eq!(calls.sends, 2);
        assert_eq!(calls.reconnects, 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let (transport, calls) = Scripted::new(vec![io_err(), io_err(), io_err()]);
        let mut engine = DeliveryEngine::new(Box::new(transport), 2, false);

        let err = engine.deliver(&MonitoringEvent::default()).unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 2, .. }));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.sends, 2);
        assert_eq!(calls.reconnects, 1);
    }

    #[test]
    fn negative_ack_is_retried_like_an_error() {
        let nack = Ok(Ack::Acknowledged {
            ok: false,
            error: Some("overloaded".to_string()),
        });
        let (transport, calls) = Scripted::new(vec![nack, ok_ack()]);
        let mut engine = DeliveryEngine::new(Box::new(transport), 2, false);

        assert!(engine.deliver(&MonitoringEvent::default()).is_ok());
        assert_eq!(calls.lock().unwrap().reconnects, 1);
    }

    #[test]
    fn final_rejection_is_reported() {
        let nack = || {
            Ok(Ack::Acknowledged {
                ok: false,
                error: Some("overloaded".to_string()),
            })
        };
        let (transport, _) = Scripted::new(vec![nack(), nack()]);
        let mut engine = DeliveryEngine::new(Box::new(transport), 2, false);

        let err = engine.deliver(&MonitoringEvent::default()).unwrap_err();
        let DeliveryError::Exhausted { last, .. } = err else {
            panic!("expected exhausted error");
        };
        assert!(matches!(*last, DeliveryError::Rejected(ref m) if m == "overloaded"));
    }

    #[test]
    fn failed_reconnect_consumes_the_attempt() {
        let (mut transport, calls) = Scripted::new(vec![io_err(), ok_ack()]);
        transport.fail_reconnect = true;
        let mut engine = DeliveryEngine::new(Box::new(transport), 2, false);

        assert!(engine.deliver(&MonitoringEvent::default()).is_err());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.sends, 1);
        assert_eq!(calls.reconnects, 1);
    }

    #[test]
    fn attempt_bound_is_configurable() {
        let (transport, calls) = Scripted::new(vec![io_err(), io_err(), ok_ack()]);
        let mut engine = DeliveryEngine::new(Box::new(transport), 3, false);

        assert!(engine.deliver(&MonitoringEvent::default()).is_ok());
        assert_eq!(calls.lock().unwrap().reconnects, 2);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let (transport, _) = Scripted::new(vec![]);
        let engine = DeliveryEngine::new(Box::new(transport), 0, false);
        assert_eq!(engine.max_attempts(), 1);
    }
}
