//! Request/response channel exposing the connection manager to a UI
//! process.
//!
//! Every request names a method and carries an argument map. Every
//! response carries the id of its request and either a success value, an
//! error code and message, or a not-implemented marker. Responses may
//! arrive out of order since connecting takes a while.

mod codec;
mod types;

pub mod client;
pub mod dispatch;
pub mod server;

pub use codec::{ClientCodec, Codec, Frame, ServerCodec};
pub use types::*;
