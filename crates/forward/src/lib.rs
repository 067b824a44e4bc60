pub mod builder;
pub mod counter;
pub mod engine;
pub mod filter;
pub mod forwarder;
pub mod layer;
pub mod proto;
pub mod transport;

pub use engine::{DeliveryEngine, DeliveryError};
pub use forwarder::{ForwardOutcome, Forwarder, ForwarderError};
pub use layer::RiemannLayer;
pub use transport::{Ack, Transport, TransportError};
