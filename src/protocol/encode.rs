//! Protocol message encoding

use super::constants::{self, tags};
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};

/// Append an encoded frontend message to `buf`
pub fn encode_message(buf: &mut BytesMut, msg: &FrontendMessage) {
    match msg {
        FrontendMessage::Startup { version, params } => {
            encode_startup(buf, *version, params);
        }
        FrontendMessage::Password(password) => {
            encode_password(buf, password);
        }
        FrontendMessage::Terminate => {
            encode_terminate(buf);
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            encode_sasl_initial_response(buf, mechanism, data);
        }
        FrontendMessage::SaslResponse { data } => {
            encode_sasl_response(buf, data);
        }
        FrontendMessage::SslRequest => {
            encode_ssl_request(buf);
        }
    }
}

/// Backfill the big-endian length of the message starting at `len_pos`
fn finish_length(buf: &mut BytesMut, len_pos: usize) {
    let len = buf.len() - len_pos;
    buf[len_pos..len_pos + 4].copy_from_slice(&(len as i32).to_be_bytes());
}

fn encode_startup(buf: &mut BytesMut, version: i32, params: &[(String, String)]) {
    // Startup messages don't have a type byte
    let len_pos = buf.len();
    buf.put_i32(0);

    buf.put_i32(version);

    for (key, value) in params {
        buf.put(key.as_bytes());
        buf.put_u8(0);
        buf.put(value.as_bytes());
        buf.put_u8(0);
    }

    buf.put_u8(0);
    finish_length(buf, len_pos);
}

fn encode_password(buf: &mut BytesMut, password: &str) {
    buf.put_u8(tags::PASSWORD);
    let len_pos = buf.len();
    buf.put_i32(0);

    buf.put(password.as_bytes());
    buf.put_u8(0);

    finish_length(buf, len_pos);
}

fn encode_terminate(buf: &mut BytesMut) {
    buf.put_u8(tags::TERMINATE);
    buf.put_i32(4); // Length includes itself
}

fn encode_sasl_initial_response(buf: &mut BytesMut, mechanism: &str, data: &[u8]) {
    buf.put_u8(tags::PASSWORD);
    let len_pos = buf.len();
    buf.put_i32(0);

    // Mechanism name (null-terminated)
    buf.put(mechanism.as_bytes());
    buf.put_u8(0);

    // SASL data (as length-prefixed bytes)
    buf.put_i32(data.len() as i32);
    buf.put_slice(data);

    finish_length(buf, len_pos);
}

fn encode_ssl_request(buf: &mut BytesMut) {
    buf.put_i32(8); // Length (includes itself)
    buf.put_i32(constants::SSL_REQUEST_CODE);
}

fn encode_sasl_response(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(tags::PASSWORD);
    let len_pos = buf.len();
    buf.put_i32(0);

    buf.put_slice(data);

    finish_length(buf, len_pos);
}

/// Build a cancel request packet on the stack
///
/// Layout: length (16), cancel code, backend pid, cancel secret, all big-endian.
/// Does not allocate, so it can be used from a signal handler.
pub fn encode_cancel_request(process_id: i32, secret_key: i32) -> [u8; constants::CANCEL_REQUEST_LEN] {
    let mut packet = [0u8; constants::CANCEL_REQUEST_LEN];
    packet[0..4].copy_from_slice(&(constants::CANCEL_REQUEST_LEN as i32).to_be_bytes());
    packet[4..8].copy_from_slice(&constants::CANCEL_REQUEST_CODE.to_be_bytes());
    packet[8..12].copy_from_slice(&process_id.to_be_bytes());
    packet[12..16].copy_from_slice(&secret_key.to_be_bytes());
    packet
}
