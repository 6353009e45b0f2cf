//! Transport-facing crate: the RPC dispatcher (C7) and the `Transport`
//! abstraction that turns a local [`ttsd_coordinator::Manager`] into
//! something a client can call and subscribe to events from without caring
//! whether the session underneath is multiplexed or single.

mod bimap;
mod channel;
mod dispatcher;
mod single_session;
mod transport;

pub use channel::ChannelTransport;
pub use dispatcher::Dispatcher;
pub use single_session::{SingleSessionTransport, SINGLE_SESSION_ID};
pub use transport::{TransportEvent, Transport, TtsRequest, TtsResponse};
