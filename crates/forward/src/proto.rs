//! Riemann protocol messages.
//!
//! Only the fields the forwarder writes or reads are declared; prost skips
//! unknown fields on decode, so replies carrying `states` or `query` still
//! parse.

use riemlog_core::model::event::MonitoringEvent;

#[derive(Clone, PartialEq, prost::Message)]
pub struct Attribute {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    #[prost(int64, optional, tag = "1")]
    pub time: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub state: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub service: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(message, repeated, tag = "9")]
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Msg {
    #[prost(bool, optional, tag = "2")]
    pub ok: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<Event>,
}

impl From<&MonitoringEvent> for Event {
    fn from(event: &MonitoringEvent) -> Self {
        Self {
            time: Some(event.time),
            state: Some(event.state.clone()),
            service: Some(event.service.clone()),
            host: Some(event.host.clone()),
            description: Some(event.description.clone()),
            tags: event.tags.clone(),
            attributes: event
                .attributes
                .iter()
                .map(|a| Attribute {
                    key: a.key.clone(),
                    value: Some(a.value.clone()),
                })
                .collect(),
        }
    }
}

impl Msg {
    pub fn from_event(event: &MonitoringEvent) -> Self {
        Self {
            events: vec![Event::from(event)],
            ..Self::default()
        }
    }

    pub fn ack() -> Self {
        Self {
            ok: Some(true),
            ..Self::default()
        }
    }

    pub fn nack(error: impl Into<String>) -> Self {
        Self {
            ok: Some(false),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
