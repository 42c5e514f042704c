//! Inter-process channel layer.
//!
//! | Module      | Purpose                                             |
//! |-------------|-----------------------------------------------------|
//! | `transport` | Framed duplex channel with reader / writer tasks    |
//! | `proxy`     | Thread-safe façade serializing access to a transport |

pub mod proxy;
pub mod transport;

pub use proxy::{ChannelProxy, SendAck};
pub use transport::{Transport, TransportEvent};
