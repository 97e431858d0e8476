//! SCRAM-SHA-256 authentication implementation
//!
//! Implements the SCRAM-SHA-256 (Salted Challenge Response Authentication Mechanism)
//! as defined in RFC 5802 for PostgreSQL authentication (Postgres 10+).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// SCRAM authentication error types
#[derive(Debug, Clone)]
pub enum ScramError {
    /// Invalid proof from server
    InvalidServerProof(String),
    /// Invalid server message format
    InvalidServerMessage(String),
    /// UTF-8 encoding/decoding error
    Utf8Error(String),
    /// Base64 decoding error
    Base64Error(String),
}

impl fmt::Display for ScramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScramError::InvalidServerProof(msg) => write!(f, "invalid server proof: {}", msg),
            ScramError::InvalidServerMessage(msg) => write!(f, "invalid server message: {}", msg),
            ScramError::Utf8Error(msg) => write!(f, "UTF-8 error: {}", msg),
            ScramError::Base64Error(msg) => write!(f, "Base64 error: {}", msg),
        }
    }
}

impl std::error::Error for ScramError {}

/// Channel binding type for SCRAM authentication
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelBinding {
    /// Client does not support channel binding (plain transport)
    None,
    /// Client supports it but the server did not offer a `-PLUS` mechanism
    NotUsed,
    /// tls-server-end-point: SHA-256 hash of the server's DER-encoded certificate
    TlsServerEndPoint(Vec<u8>),
}

/// Internal state needed for SCRAM authentication
#[derive(Clone, Debug)]
pub struct ScramState {
    /// Combined authentication message (for verification)
    auth_message: Vec<u8>,
    /// Server key (for verification calculation)
    server_key: Vec<u8>,
}

/// SCRAM-SHA-256 client implementation
///
/// The user name is sent empty: the server authenticates the user named in
/// the startup packet.
pub struct ScramClient {
    password: String,
    nonce: String,
    channel_binding: ChannelBinding,
}

impl std::fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramClient")
            .field("nonce", &self.nonce)
            .field("channel_binding", &self.channel_binding)
            .finish_non_exhaustive()
    }
}

impl ScramClient {
    /// Create a new SCRAM client without channel binding
    pub fn new(password: String) -> Self {
        Self::with_channel_binding(password, ChannelBinding::None)
    }

    /// Create a new SCRAM client with channel binding
    pub fn with_channel_binding(password: String, channel_binding: ChannelBinding) -> Self {
        let mut rng = rand::thread_rng();
        let nonce_bytes: Vec<u8> = (0..24).map(|_| rng.gen()).collect();
        let nonce = BASE64.encode(&nonce_bytes);

        Self {
            password,
            nonce,
            channel_binding,
        }
    }

    /// GS2 header for the SCRAM exchange
    fn gs2_header(&self) -> &'static str {
        match self.channel_binding {
            ChannelBinding::None => "n,,",
            ChannelBinding::NotUsed => "y,,",
            ChannelBinding::TlsServerEndPoint(_) => "p=tls-server-end-point,,",
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// Generate client first message
    pub fn client_first(&self) -> String {
        format!("{}{}", self.gs2_header(), self.client_first_bare())
    }

    /// Process server first message and generate client final message
    ///
    /// Returns (client_final_message, internal_state)
    pub fn client_final(&mut self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        // Parse server first message: r=<client_nonce><server_nonce>,s=<salt>,i=<iterations>
        let (server_nonce, salt, iterations) = parse_server_first(server_first)?;

        // Verify server nonce starts with our client nonce
        if !server_nonce.starts_with(&self.nonce) {
            return Err(ScramError::InvalidServerMessage(
                "server nonce doesn't contain client nonce".to_string(),
            ));
        }

        // Decode salt and iterations
        let salt_bytes = BASE64
            .decode(&salt)
            .map_err(|_| ScramError::Base64Error("invalid salt encoding".to_string()))?;
        let iterations = iterations
            .parse::<u32>()
            .ok()
            .filter(|&i| i > 0)
            .ok_or_else(|| ScramError::InvalidServerMessage("invalid iteration count".to_string()))?;

        // RFC 5802: c = base64(gs2-header + channel-binding-data)
        let mut gs2_cbind = self.gs2_header().as_bytes().to_vec();
        if let ChannelBinding::TlsServerEndPoint(data) = &self.channel_binding {
            gs2_cbind.extend_from_slice(data);
        }
        let channel_binding = BASE64.encode(&gs2_cbind);

        let client_final_without_proof = format!("c={},r={}", channel_binding, server_nonce);

        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );

        let salted_password = salt_password(&self.password, &salt_bytes, iterations)?;
        let proof = calculate_client_proof(&salted_password, auth_message.as_bytes())?;
        let server_key = hmac_sha256(&salted_password, b"Server Key")?;

        // Build client final message
        let client_final = format!("{},p={}", client_final_without_proof, BASE64.encode(&proof));

        let state = ScramState {
            auth_message: auth_message.into_bytes(),
            server_key,
        };

        Ok((client_final, state))
    }

    /// Verify server final message and confirm authentication
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        // Parse server final: v=<server_signature>
        let server_sig_encoded = server_final
            .strip_prefix("v=")
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' prefix".to_string()))?;

        let server_signature = BASE64.decode(server_sig_encoded).map_err(|_| {
            ScramError::Base64Error("invalid server signature encoding".to_string())
        })?;

        let expected_signature = hmac_sha256(&state.server_key, &state.auth_message)?;

        // Constant-time comparison
        if constant_time_compare(&server_signature, &expected_signature) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

/// Parse server first message format: r=<nonce>,s=<salt>,i=<iterations>
fn parse_server_first(msg: &str) -> Result<(String, String, String), ScramError> {
    let mut nonce = String::new();
    let mut salt = String::new();
    let mut iterations = String::new();

    for part in msg.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            nonce = value.to_string();
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = value.to_string();
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = value.to_string();
        }
    }

    if nonce.is_empty() || salt.is_empty() || iterations.is_empty() {
        return Err(ScramError::InvalidServerMessage(
            "missing required fields in server first message".to_string(),
        ));
    }

    Ok((nonce, salt, iterations))
}

/// SaltedPassword := PBKDF2(password, salt, iterations, HMAC-SHA256)
fn salt_password(password: &str, salt: &[u8], iterations: u32) -> Result<Vec<u8>, ScramError> {
    let mut salted_password = vec![0u8; 32]; // SHA256 produces 32 bytes
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut salted_password)
        .map_err(|_| ScramError::InvalidServerMessage("key derivation failed".to_string()))?;
    Ok(salted_password)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ScramError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| ScramError::InvalidServerMessage("HMAC key error".to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Calculate SCRAM client proof
fn calculate_client_proof(salted_password: &[u8], auth_message: &[u8]) -> Result<Vec<u8>, ScramError> {
    // ClientKey := HMAC(SaltedPassword, "Client Key")
    let client_key = hmac_sha256(salted_password, b"Client Key")?;

    // StoredKey := SHA256(ClientKey)
    let stored_key = Sha256::digest(&client_key);

    // ClientSignature := HMAC(StoredKey, AuthMessage)
    let client_signature = hmac_sha256(&stored_key, auth_message)?;

    // ClientProof := ClientKey XOR ClientSignature
    let mut proof = client_key;
    for (proof_byte, sig_byte) in proof.iter_mut().zip(client_signature.iter()) {
        *proof_byte ^= sig_byte;
    }

    Ok(proof)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
