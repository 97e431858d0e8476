//! Postgres wire protocol pieces used during connection establishment
//!
//! Only the startup, negotiation and authentication subset is implemented:
//! message framing, the frontend messages sent before ReadyForQuery, and the
//! backend messages the server may send back before the connection is usable.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{
    decode_auth_frame, decode_auth_request, decode_error_fields, decode_frame,
    decode_startup_message, Decoded, Frame,
};
pub use encode::{encode_cancel_request, encode_message};
pub use message::{AuthFrame, AuthRequest, BackendMessage, ErrorFields, FrontendMessage};
