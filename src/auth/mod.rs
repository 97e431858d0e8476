//! Authentication method handlers
//!
//! [`Authenticator`] turns one server authentication request into the next
//! frontend message. Each supported method keeps its credential computation
//! private: cleartext, MD5 ([`md5_password`]) and SCRAM-SHA-256
//! ([`ScramClient`]). Methods this client does not implement are rejected.

mod md5;
mod scram;

pub use self::md5::md5_password;
pub use scram::{ChannelBinding, ScramClient, ScramError, ScramState};

use crate::metrics::labels;
use crate::protocol::{AuthRequest, FrontendMessage};
use crate::{Error, Result};
use std::time::Instant;

/// SASL mechanism name without channel binding
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// SASL mechanism name with tls-server-end-point channel binding
pub const SCRAM_SHA_256_PLUS: &str = "SCRAM-SHA-256-PLUS";

/// What the connection should do after a request was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Send this message, then wait for the next request
    Send(FrontendMessage),
    /// Nothing to send; wait for the next request
    Wait,
    /// Server accepted the credentials
    Authenticated,
}

enum SaslPhase {
    Idle,
    AwaitingContinue(ScramClient),
    AwaitingFinal(ScramClient, ScramState),
    Verified,
}

/// Per-connection authentication exchange
pub struct Authenticator {
    user: String,
    password: String,
    /// `Some` when the transport is TLS and a certificate hash is available
    tls_server_end_point: Option<Vec<u8>>,
    mechanism: &'static str,
    started: Option<Instant>,
    sasl: SaslPhase,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("user", &self.user)
            .field("mechanism", &self.mechanism)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Create an authenticator for a plain transport
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            tls_server_end_point: None,
            mechanism: labels::MECHANISM_NONE,
            started: None,
            sasl: SaslPhase::Idle,
        }
    }

    /// Enable SCRAM channel binding with the server certificate hash
    pub fn with_channel_binding(mut self, server_end_point: Option<Vec<u8>>) -> Self {
        self.tls_server_end_point = server_end_point;
        self
    }

    /// Metrics label of the method in use so far
    pub fn mechanism(&self) -> &'static str {
        self.mechanism
    }

    /// Handle one authentication request from the server
    pub fn handle(&mut self, request: AuthRequest) -> Result<AuthAction> {
        if !matches!(request, AuthRequest::Ok) && self.started.is_none() {
            self.started = Some(Instant::now());
        }

        match request {
            AuthRequest::Ok => {
                if matches!(
                    self.sasl,
                    SaslPhase::AwaitingContinue(_) | SaslPhase::AwaitingFinal(..)
                ) {
                    return Err(self.fail(
                        "protocol",
                        Error::Authentication(
                            "server accepted authentication before the SASL exchange completed"
                                .into(),
                        ),
                    ));
                }
                crate::metrics::counters::auth_successful(self.mechanism);
                if let Some(started) = self.started {
                    crate::metrics::histograms::auth_duration(
                        self.mechanism,
                        started.elapsed().as_millis() as u64,
                    );
                }
                tracing::debug!(mechanism = self.mechanism, "authentication successful");
                Ok(AuthAction::Authenticated)
            }
            AuthRequest::CleartextPassword => {
                self.begin(labels::MECHANISM_CLEARTEXT);
                let password = self.password()?.to_string();
                Ok(AuthAction::Send(FrontendMessage::Password(password)))
            }
            AuthRequest::Md5Password { salt } => {
                self.begin(labels::MECHANISM_MD5);
                let hashed = md5_password(&self.user, self.password()?, &salt);
                Ok(AuthAction::Send(FrontendMessage::Password(hashed)))
            }
            AuthRequest::Sasl { mechanisms } => self.sasl_start(&mechanisms),
            AuthRequest::SaslContinue { data } => self.sasl_continue(&data),
            AuthRequest::SaslFinal { data } => self.sasl_final(&data),
            AuthRequest::KerberosV4 => {
                Err(self.unsupported("Kerberos 4 authentication not supported"))
            }
            AuthRequest::KerberosV5 => {
                Err(self.unsupported("Kerberos 5 authentication not supported"))
            }
            AuthRequest::CryptPassword { .. } => {
                Err(self.unsupported("crypt authentication not supported"))
            }
            AuthRequest::ScmCredential => {
                Err(self.unsupported("SCM_CRED authentication method not supported"))
            }
            AuthRequest::Gss | AuthRequest::GssContinue => {
                Err(self.unsupported("GSSAPI authentication not supported"))
            }
            AuthRequest::Sspi => Err(self.unsupported("SSPI authentication not supported")),
            AuthRequest::Unknown(code) => Err(self.unsupported(&format!(
                "authentication method {} not supported",
                code
            ))),
        }
    }

    /// Record a failure reported by the server during the exchange
    pub fn server_rejected(&self) {
        crate::metrics::counters::auth_failed(self.mechanism, "server_error");
    }

    fn begin(&mut self, mechanism: &'static str) {
        self.mechanism = mechanism;
        crate::metrics::counters::auth_attempted(mechanism);
    }

    fn password(&self) -> Result<&str> {
        if self.password.is_empty() {
            crate::metrics::counters::auth_failed(self.mechanism, "no_password");
            return Err(Error::Authentication("no password supplied".into()));
        }
        Ok(&self.password)
    }

    fn fail(&self, reason: &'static str, err: Error) -> Error {
        crate::metrics::counters::auth_failed(self.mechanism, reason);
        err
    }

    fn unsupported(&mut self, message: &str) -> Error {
        self.mechanism = labels::MECHANISM_UNSUPPORTED;
        self.fail("unsupported", Error::Authentication(message.to_string()))
    }

    fn sasl_start(&mut self, mechanisms: &[String]) -> Result<AuthAction> {
        let offers = |name: &str| mechanisms.iter().any(|m| m == name);

        let (mechanism, label, binding) = match self.tls_server_end_point.clone() {
            Some(hash) if offers(SCRAM_SHA_256_PLUS) => (
                SCRAM_SHA_256_PLUS,
                labels::MECHANISM_SCRAM_PLUS,
                ChannelBinding::TlsServerEndPoint(hash),
            ),
            Some(_) if offers(SCRAM_SHA_256) => {
                (SCRAM_SHA_256, labels::MECHANISM_SCRAM, ChannelBinding::NotUsed)
            }
            None if offers(SCRAM_SHA_256) => {
                (SCRAM_SHA_256, labels::MECHANISM_SCRAM, ChannelBinding::None)
            }
            _ => {
                return Err(self.unsupported(&format!(
                    "none of the server's SASL authentication mechanisms are supported: {}",
                    mechanisms.join(", ")
                )))
            }
        };

        self.begin(label);
        let scram = ScramClient::with_channel_binding(self.password()?.to_string(), binding);
        tracing::debug!(mechanism, "starting SASL exchange");

        let data = scram.client_first().into_bytes();
        self.sasl = SaslPhase::AwaitingContinue(scram);
        Ok(AuthAction::Send(FrontendMessage::SaslInitialResponse {
            mechanism: mechanism.to_string(),
            data,
        }))
    }

    fn sasl_continue(&mut self, data: &[u8]) -> Result<AuthAction> {
        let SaslPhase::AwaitingContinue(mut scram) =
            std::mem::replace(&mut self.sasl, SaslPhase::Idle)
        else {
            return Err(self.fail(
                "protocol",
                Error::Protocol("unexpected SASL continue message".into()),
            ));
        };

        let server_first = std::str::from_utf8(data).map_err(|e| {
            self.fail(
                "protocol",
                Error::Authentication(format!("invalid UTF-8 in server first message: {}", e)),
            )
        })?;
        let (client_final, state) = scram.client_final(server_first).map_err(|e| {
            self.fail("scram", Error::Authentication(format!("SCRAM error: {}", e)))
        })?;

        self.sasl = SaslPhase::AwaitingFinal(scram, state);
        Ok(AuthAction::Send(FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        }))
    }

    fn sasl_final(&mut self, data: &[u8]) -> Result<AuthAction> {
        let SaslPhase::AwaitingFinal(scram, state) =
            std::mem::replace(&mut self.sasl, SaslPhase::Idle)
        else {
            return Err(self.fail(
                "protocol",
                Error::Protocol("unexpected SASL final message".into()),
            ));
        };

        let server_final = std::str::from_utf8(data).map_err(|e| {
            self.fail(
                "protocol",
                Error::Authentication(format!("invalid UTF-8 in server final message: {}", e)),
            )
        })?;
        scram.verify_server_final(server_final, &state).map_err(|e| {
            self.fail(
                "scram",
                Error::Authentication(format!("SCRAM verification failed: {}", e)),
            )
        })?;

        self.sasl = SaslPhase::Verified;
        tracing::debug!("server signature verified");
        Ok(AuthAction::Wait)
    }
}
