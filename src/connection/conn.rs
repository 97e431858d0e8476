//! Connection handle and its non-blocking startup state machine
//!
//! [`Connection::start`] resolves the candidate addresses and runs the state
//! machine until it first has to wait on the socket. Each
//! [`Connection::connect_poll`] call then runs as many steps as the socket
//! allows and reports the readiness to wait for next. The blocking and async
//! drivers live in `driver` and `async_driver`.

use super::address::{resolve_candidates, CandidateAddress};
use super::buffer::{Fill, InBuffer};
use super::cancel::CancelToken;
use super::driver::deadline;
use super::session::{NoticeProcessor, ReaderOutcome, ResultReader, Session, StartupResultReader};
use super::state::{ConnectionStatus, Direction, PollingStatus, Step};
use super::tls::{parse_server_name, TlsConfig};
use super::transport::Transport;
use crate::auth::{AuthAction, Authenticator};
use crate::conninfo::ConnectionParameters;
use crate::metrics::labels;
use crate::protocol::constants::{ssl_response, PROTOCOL_VERSION};
use crate::protocol::{
    decode_auth_frame, decode_frame, encode_message, AuthFrame, Decoded, FrontendMessage,
};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use socket2::{SockAddr, Socket, Type};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Instant;

const INITIAL_BUFFER_SIZE: usize = 16 * 1024;

const SSL_REQUIRED: &str = "server does not support SSL, but SSL was required";

fn no_socket() -> Error {
    Error::InvalidState {
        expected: "open socket".into(),
        actual: "no socket".into(),
    }
}

/// One connection to a server, from the first candidate address to the live session
///
/// The handle owns its socket and buffers. Failures never close the socket;
/// dropping the handle (or [`finish`](Self::finish)) does.
pub struct Connection {
    params: ConnectionParameters,
    status: ConnectionStatus,

    candidates: Vec<CandidateAddress>,
    candidate_index: usize,
    /// Set when the caller supplied the candidate list instead of the resolver
    fixed_candidates: Option<Vec<CandidateAddress>>,

    transport: Option<Transport>,
    socket_generation: u64,
    inbuf: InBuffer,
    outbuf: BytesMut,

    allow_ssl: bool,
    tls_config: Option<TlsConfig>,

    remote_address: Option<CandidateAddress>,
    local_address: Option<SockAddr>,

    authenticator: Option<Authenticator>,
    reader: Box<dyn ResultReader>,
    session: Session,

    error_message: String,
    last_error: Option<Error>,
    started_at: Instant,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.status)
            .field("candidate_index", &self.candidate_index)
            .field("candidates", &self.candidates)
            .field("transport", &self.transport)
            .field("remote_address", &self.remote_address)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Begin connecting with resolved parameters
    ///
    /// Never blocks on the network. Resolution failures leave the handle in
    /// `Bad` with the reason in [`error_message`](Self::error_message).
    pub fn start(params: ConnectionParameters) -> Self {
        Self::start_inner(params, None)
    }

    /// Begin connecting to an explicit, ordered candidate list
    ///
    /// The list is used as-is for this attempt and every reset.
    pub fn start_with_candidates(
        params: ConnectionParameters,
        candidates: Vec<CandidateAddress>,
    ) -> Self {
        Self::start_inner(params, Some(candidates))
    }

    fn start_inner(
        params: ConnectionParameters,
        fixed_candidates: Option<Vec<CandidateAddress>>,
    ) -> Self {
        let allow_ssl = params.allow_ssl();
        let mut conn = Self {
            params,
            status: ConnectionStatus::Init,
            candidates: Vec::new(),
            candidate_index: 0,
            fixed_candidates,
            transport: None,
            socket_generation: 0,
            inbuf: InBuffer::with_capacity(INITIAL_BUFFER_SIZE),
            outbuf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            allow_ssl,
            tls_config: None,
            remote_address: None,
            local_address: None,
            authenticator: None,
            reader: Box::new(StartupResultReader),
            session: Session::default(),
            error_message: String::new(),
            last_error: None,
            started_at: Instant::now(),
            deadline: None,
        };
        conn.begin();
        conn
    }

    /// Clear per-attempt state, load candidates and run until the first wait
    fn begin(&mut self) {
        crate::metrics::counters::connection_attempted();
        self.started_at = Instant::now();
        self.deadline = deadline(&self.params, self.started_at);
        self.status = ConnectionStatus::Init;
        self.close_socket();
        self.candidate_index = 0;
        self.allow_ssl = self.params.allow_ssl();
        self.remote_address = None;
        self.local_address = None;
        self.authenticator = None;
        self.session.clear();
        self.error_message.clear();
        self.last_error = None;

        let candidates = match &self.fixed_candidates {
            Some(fixed) if fixed.is_empty() => Err(Error::AddressResolution(
                "no candidate addresses".into(),
            )),
            Some(fixed) => Ok(fixed.clone()),
            None => resolve_candidates(&self.params),
        };
        match candidates {
            Ok(candidates) => {
                tracing::debug!(count = candidates.len(), "candidate addresses");
                self.candidates = candidates;
                self.connect_poll();
            }
            Err(e) => self.fail(e),
        }
    }

    /// Advance the state machine as far as the socket allows
    ///
    /// Call again once the socket is ready in the returned direction. `Ok`
    /// and `Failed` are final until the handle is reset.
    pub fn connect_poll(&mut self) -> PollingStatus {
        let span = tracing::debug_span!("connect_poll", status = %self.status);
        let _enter = span.enter();

        loop {
            match self.status {
                ConnectionStatus::Ok => return PollingStatus::Ok,
                ConnectionStatus::Bad => return PollingStatus::Failed,
                _ => {}
            }

            match self.step().unwrap_or_else(Step::Fail) {
                Step::Advance(next) => {
                    tracing::debug!(from = %self.status, to = %next, "state transition");
                    if let Err(e) = self.status.transition(next) {
                        self.fail(e);
                    }
                }
                Step::Suspend(direction) => return direction.into(),
                Step::Fail(e) => {
                    self.fail(e);
                    return PollingStatus::Failed;
                }
                Step::Done => {
                    if let Err(e) = self.status.transition(ConnectionStatus::Ok) {
                        self.fail(e);
                        return PollingStatus::Failed;
                    }
                    self.established();
                    return PollingStatus::Ok;
                }
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        match self.status {
            ConnectionStatus::Init => self.open_socket(),
            ConnectionStatus::SocketOpen => self.start_connect(),
            ConnectionStatus::Connecting => self.finish_connect(),
            ConnectionStatus::TlsNegotiate => self.negotiate_tls(),
            ConnectionStatus::StartupSent | ConnectionStatus::AuthExchange => {
                match self.flush_output()? {
                    Some(direction) => Ok(Step::Suspend(direction)),
                    None => Ok(Step::Advance(ConnectionStatus::AuthWait)),
                }
            }
            ConnectionStatus::AuthWait => self.read_auth(),
            ConnectionStatus::AuthOk => self.read_startup_results(),
            ConnectionStatus::Ok => Ok(Step::Done),
            ConnectionStatus::Bad => Err(self.last_error.clone().unwrap_or(Error::InvalidState {
                expected: "connection in progress".into(),
                actual: ConnectionStatus::Bad.to_string(),
            })),
        }
    }

    fn current_candidate(&self) -> Result<&CandidateAddress> {
        self.candidates
            .get(self.candidate_index)
            .ok_or_else(|| Error::AddressResolution("no candidate addresses".into()))
    }

    fn has_next_candidate(&self) -> bool {
        self.candidate_index + 1 < self.candidates.len()
    }

    fn sock(&self) -> Result<&Socket> {
        self.transport
            .as_ref()
            .map(Transport::socket)
            .ok_or_else(no_socket)
    }

    fn new_socket(candidate: &CandidateAddress) -> io::Result<Socket> {
        let socket = Socket::new(candidate.domain(), Type::STREAM, None)?;
        if !candidate.is_unix() {
            socket.set_nodelay(true)?;
        }
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    /// `Init`: create a socket for the current candidate
    fn open_socket(&mut self) -> Result<Step> {
        loop {
            let candidate = self.current_candidate()?;
            tracing::debug!(address = %candidate, index = self.candidate_index, "trying candidate address");

            match Self::new_socket(candidate) {
                Ok(socket) => {
                    self.transport = Some(Transport::Plain(socket));
                    self.socket_generation += 1;
                    return Ok(Step::Advance(ConnectionStatus::SocketOpen));
                }
                Err(e) if self.has_next_candidate() => {
                    tracing::debug!(error = %e, "could not create socket, trying next address");
                    crate::metrics::counters::candidate_failed();
                    self.candidate_index += 1;
                }
                Err(e) => {
                    return Err(Error::Socket(format!("could not create socket: {}", e)));
                }
            }
        }
    }

    /// `SocketOpen`: issue the non-blocking connect
    fn start_connect(&mut self) -> Result<Step> {
        let addr = self.current_candidate()?.sock_addr()?;
        let result = self.sock()?.connect(&addr);
        match result {
            Ok(()) => self.connection_made(),
            Err(e)
                if e.raw_os_error() == Some(libc::EINPROGRESS)
                    || e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(Step::Advance(ConnectionStatus::Connecting))
            }
            Err(e) => self.candidate_failed(e),
        }
    }

    /// `Connecting`: check whether the deferred connect finished
    fn finish_connect(&mut self) -> Result<Step> {
        let outcome = {
            let socket = self.sock()?;
            match socket.take_error() {
                Ok(Some(e)) | Err(e) => Err(e),
                Ok(None) => socket.peer_addr().map(|_| ()),
            }
        };

        match outcome {
            Ok(()) => self.connection_made(),
            Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => {
                Ok(Step::Suspend(Direction::Writing))
            }
            Err(e) => self.candidate_failed(e),
        }
    }

    /// Drop the current candidate; move on, or fail if it was the last
    fn candidate_failed(&mut self, err: io::Error) -> Result<Step> {
        let candidate = self.current_candidate()?.clone();
        tracing::debug!(address = %candidate, error = %err, "candidate address failed");
        self.close_socket();

        let failure = Error::Connect(self.connect_failure_message(&candidate, &err));
        if failure.is_retryable_connect() && self.has_next_candidate() {
            crate::metrics::counters::candidate_failed();
            self.candidate_index += 1;
            return Ok(Step::Advance(ConnectionStatus::Init));
        }

        Err(failure)
    }

    fn connect_failure_message(&self, candidate: &CandidateAddress, err: &io::Error) -> String {
        match candidate {
            CandidateAddress::Unix(path) => format!(
                "could not connect to server: {}\n\tIs the server running locally and accepting\n\tconnections on Unix domain socket \"{}\"?",
                err,
                path.display()
            ),
            CandidateAddress::Inet(addr) => {
                let host = self
                    .params
                    .host()
                    .or_else(|| self.params.hostaddr())
                    .map(str::to_string)
                    .unwrap_or_else(|| addr.ip().to_string());
                format!(
                    "could not connect to server: {}\n\tIs the server running on host \"{}\" and accepting\n\tTCP/IP connections on port {}?",
                    err,
                    host,
                    addr.port()
                )
            }
        }
    }

    /// The socket is connected: commit the candidate and start negotiating
    fn connection_made(&mut self) -> Result<Step> {
        let candidate = self.current_candidate()?.clone();
        let local = self.sock()?.local_addr().map_err(|e| {
            Error::Socket(format!("could not get client address from socket: {}", e))
        })?;
        tracing::debug!(address = %candidate, "connected");
        self.local_address = Some(local);
        let is_unix = candidate.is_unix();
        self.remote_address = Some(candidate);

        // No TLS over a local socket
        if is_unix {
            self.queue_startup()?;
            return Ok(Step::Advance(ConnectionStatus::StartupSent));
        }

        if self.allow_ssl {
            self.queue(&FrontendMessage::SslRequest);
            return Ok(Step::Advance(ConnectionStatus::TlsNegotiate));
        }
        if self.params.require_ssl() {
            return Err(Error::Connect(SSL_REQUIRED.into()));
        }

        self.queue_startup()?;
        Ok(Step::Advance(ConnectionStatus::StartupSent))
    }

    /// `TlsNegotiate`: send SSLRequest, read the one-byte answer, run the handshake
    fn negotiate_tls(&mut self) -> Result<Step> {
        if self.transport.as_ref().is_some_and(Transport::is_tls) {
            return self.continue_tls_handshake();
        }

        if let Some(direction) = self.flush_output()? {
            return Ok(Step::Suspend(direction));
        }

        // Read exactly one byte so the server's handshake records stay on the socket
        let mut answer = [0u8; 1];
        let transport = self.transport.as_mut().ok_or_else(no_socket)?;
        let n = loop {
            match io::Read::read(transport, &mut answer) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Step::Suspend(Direction::Reading));
                }
                Err(e) => {
                    return Err(Error::Connect(format!(
                        "could not receive server response to SSL negotiation packet: {}",
                        e
                    )));
                }
            }
        };
        if n == 0 {
            return Err(Error::Connect(
                "could not receive server response to SSL negotiation packet: server closed the connection"
                    .into(),
            ));
        }

        match answer[0] {
            ssl_response::ACCEPT => {
                crate::metrics::counters::tls_negotiated(labels::TLS_ACCEPTED);
                tracing::debug!("server accepted TLS, starting handshake");

                let config = match &self.tls_config {
                    Some(config) => config.clone(),
                    None => {
                        let config = TlsConfig::from_params(&self.params)?;
                        self.tls_config = Some(config.clone());
                        config
                    }
                };
                let server_name = parse_server_name(&self.params)?;
                let plain = self.transport.take().ok_or_else(no_socket)?;
                self.transport = Some(plain.start_tls(config.client_config(), server_name)?);
                self.continue_tls_handshake()
            }
            ssl_response::REJECT => {
                crate::metrics::counters::tls_negotiated(labels::TLS_REJECTED);
                if self.params.require_ssl() {
                    return Err(Error::Connect(SSL_REQUIRED.into()));
                }
                tracing::debug!("server rejected TLS, continuing unencrypted");
                self.queue_startup()?;
                Ok(Step::Advance(ConnectionStatus::StartupSent))
            }
            ssl_response::ERROR => {
                // Server predates SSL negotiation; start over without it
                crate::metrics::counters::tls_negotiated(labels::TLS_FALLBACK);
                tracing::debug!("server does not understand SSL negotiation, retrying without it");
                self.close_socket();
                self.allow_ssl = false;
                self.candidate_index = 0;
                Ok(Step::Advance(ConnectionStatus::Init))
            }
            other => Err(Error::Protocol(format!(
                "received invalid response to SSL negotiation: {}",
                other as char
            ))),
        }
    }

    fn continue_tls_handshake(&mut self) -> Result<Step> {
        let transport = self.transport.as_mut().ok_or_else(no_socket)?;
        match transport.continue_handshake() {
            Ok(Some(direction)) => Ok(Step::Suspend(direction)),
            Ok(None) => {
                tracing::info!("TLS connection established");
                self.queue_startup()?;
                Ok(Step::Advance(ConnectionStatus::StartupSent))
            }
            Err(e) => Err(Error::Connect(format!("SSL handshake failed: {}", e))),
        }
    }

    /// Queue the startup message and prepare the authenticator for this transport
    fn queue_startup(&mut self) -> Result<()> {
        let mut startup_params: Vec<(String, String)> = Vec::new();
        if let Some(user) = self.params.user() {
            startup_params.push(("user".into(), user.into()));
        }
        if let Some(dbname) = self.params.dbname() {
            startup_params.push(("database".into(), dbname.into()));
        }
        if !self.params.options().is_empty() {
            startup_params.push(("options".into(), self.params.options().into()));
        }
        startup_params.extend(self.params.backend_settings().iter().cloned());

        let channel_binding = self
            .transport
            .as_ref()
            .ok_or_else(no_socket)?
            .channel_binding_data();
        self.authenticator = Some(
            Authenticator::new(self.params.user().unwrap_or_default(), self.params.password())
                .with_channel_binding(channel_binding),
        );

        self.queue(&FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params: startup_params,
        });
        Ok(())
    }

    fn queue(&mut self, msg: &FrontendMessage) {
        encode_message(&mut self.outbuf, msg);
    }

    /// Write queued output; `Some` means the socket would block
    fn flush_output(&mut self) -> Result<Option<Direction>> {
        let transport = self.transport.as_mut().ok_or_else(no_socket)?;

        while !self.outbuf.is_empty() {
            match transport.write(&self.outbuf) {
                Ok(0) => {
                    return Err(Error::Socket(
                        "could not send data to server: connection closed".into(),
                    ));
                }
                Ok(n) => self.outbuf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Some(Direction::Writing));
                }
                Err(e) => {
                    return Err(Error::Socket(format!(
                        "could not send data to server: {}",
                        e
                    )));
                }
            }
        }

        loop {
            match transport.flush() {
                Ok(()) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Some(Direction::Writing));
                }
                Err(e) => {
                    return Err(Error::Socket(format!(
                        "could not send data to server: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Read more input so at least `required` bytes could be buffered;
    /// `Some` means the socket would block
    fn fill_input(&mut self, required: usize) -> Result<Option<Direction>> {
        let transport = self.transport.as_mut().ok_or_else(no_socket)?;
        match self.inbuf.fill_from(transport, required)? {
            Fill::Read(_) => Ok(None),
            Fill::WouldBlock => Ok(Some(Direction::Reading)),
            Fill::Eof => Err(Error::Socket(
                "server closed the connection unexpectedly\n\tThis probably means the server terminated abnormally\n\tbefore or while processing the request."
                    .into(),
            )),
        }
    }

    /// `AuthWait`: parse authentication requests and answer them
    fn read_auth(&mut self) -> Result<Step> {
        loop {
            let decoded = decode_auth_frame(self.inbuf.data())?;
            let (frame, consumed) = match decoded {
                Decoded::NeedMoreData { required } => {
                    if let Some(direction) = self.fill_input(required)? {
                        return Ok(Step::Suspend(direction));
                    }
                    continue;
                }
                Decoded::Parsed { value, consumed } => (value, consumed),
            };
            self.inbuf.consume(consumed);

            match frame {
                AuthFrame::Request(request) => {
                    tracing::debug!(code = request.code(), "authentication request");
                    let authenticator = self.authenticator.as_mut().ok_or_else(|| {
                        Error::InvalidState {
                            expected: "startup message sent".into(),
                            actual: self.status.to_string(),
                        }
                    })?;
                    match authenticator.handle(request)? {
                        AuthAction::Send(msg) => {
                            self.queue(&msg);
                            return Ok(Step::Advance(ConnectionStatus::AuthExchange));
                        }
                        AuthAction::Wait => {}
                        AuthAction::Authenticated => {
                            return Ok(Step::Advance(ConnectionStatus::AuthOk));
                        }
                    }
                }
                AuthFrame::Error(fields) => {
                    if let Some(authenticator) = &self.authenticator {
                        authenticator.server_rejected();
                    }
                    return Err(Error::ServerReported(fields.to_string()));
                }
                AuthFrame::LegacyError(text) => {
                    return Err(Error::ServerReported(text));
                }
            }
        }
    }

    /// `AuthOk`: feed messages to the result reader until ReadyForQuery
    fn read_startup_results(&mut self) -> Result<Step> {
        loop {
            let decoded = decode_frame(self.inbuf.data())?;
            let (outcome, consumed) = match decoded {
                Decoded::NeedMoreData { required } => {
                    if let Some(direction) = self.fill_input(required)? {
                        return Ok(Step::Suspend(direction));
                    }
                    continue;
                }
                Decoded::Parsed { value, consumed } => (
                    self.reader.handle(value.tag, value.body, &mut self.session)?,
                    consumed,
                ),
            };
            self.inbuf.consume(consumed);

            if outcome == ReaderOutcome::Ready {
                return Ok(Step::Done);
            }
        }
    }

    fn established(&mut self) {
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        crate::metrics::counters::connection_established();
        crate::metrics::histograms::connect_duration(elapsed_ms);
        self.candidates.clear();
        self.authenticator = None;

        if let Some(address) = &self.remote_address {
            tracing::info!(
                address = %address,
                tls = self.is_tls(),
                pid = self.session.backend_pid,
                elapsed_ms,
                "connection established"
            );
        }
    }

    /// Move to `Bad`, keeping the socket open for inspection
    pub(crate) fn fail(&mut self, err: Error) {
        tracing::debug!(status = %self.status, error = %err, "connection failed");
        self.status = ConnectionStatus::Bad;
        self.error_message.push_str(&err.to_string());
        self.error_message.push('\n');
        crate::metrics::counters::connection_failed(err.category());
        self.last_error = Some(err);
    }

    fn close_socket(&mut self) {
        self.transport = None;
        self.inbuf.clear();
        self.outbuf.clear();
    }

    /// Best-effort Terminate on a live connection
    fn send_terminate(&mut self) {
        if self.status != ConnectionStatus::Ok {
            return;
        }
        self.outbuf.clear();
        self.queue(&FrontendMessage::Terminate);
        if let Err(e) = self.flush_output() {
            tracing::debug!(error = %e, "could not send terminate message");
        }
    }

    /// Close the connection and start a new attempt with the same parameters
    ///
    /// Only valid once the previous attempt reached `Ok` or `Bad`.
    pub fn reset_start(&mut self) -> Result<()> {
        if !self.status.is_terminal() {
            return Err(Error::InvalidState {
                expected: "ok or bad".into(),
                actual: self.status.to_string(),
            });
        }
        self.send_terminate();
        tracing::debug!("resetting connection");
        self.begin();
        Ok(())
    }

    /// Poll a reset started with [`reset_start`](Self::reset_start)
    pub fn reset_poll(&mut self) -> PollingStatus {
        self.connect_poll()
    }

    /// Send Terminate if the connection is live, then close it
    pub fn finish(mut self) {
        self.send_terminate();
        self.close_socket();
    }

    /// Current lifecycle status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Every failure message so far, newline-terminated
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// The error that moved the handle to `Bad`
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Parameters this handle connects with
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Database name
    pub fn db(&self) -> Option<&str> {
        self.params.dbname()
    }

    /// User name
    pub fn user(&self) -> Option<&str> {
        self.params.user()
    }

    /// Password in use (possibly from the password file)
    pub fn password(&self) -> &str {
        self.params.password()
    }

    /// Host name, if connecting over TCP by name
    pub fn host(&self) -> Option<&str> {
        self.params.host()
    }

    /// Port, as configured
    pub fn port(&self) -> &str {
        self.params.port()
    }

    /// Legacy debug tty
    pub fn tty(&self) -> &str {
        self.params.tty()
    }

    /// Extra backend command-line options
    pub fn options(&self) -> &str {
        self.params.options()
    }

    /// Socket descriptor, while one is open
    pub fn socket(&self) -> Option<RawFd> {
        self.transport.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Backend process id; only once the connection is established
    pub fn backend_pid(&self) -> Option<i32> {
        match self.status {
            ConnectionStatus::Ok => self.session.backend_pid(),
            _ => None,
        }
    }

    /// Server parameter reported during startup (`server_version`, `TimeZone`, ...)
    pub fn parameter_status(&self, name: &str) -> Option<&str> {
        self.session.parameter(name)
    }

    /// Transaction status byte from the last ReadyForQuery
    pub fn transaction_status(&self) -> Option<u8> {
        self.session.transaction_status()
    }

    /// Whether the transport is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_tls)
    }

    /// Address of the candidate that accepted the connection
    pub fn remote_address(&self) -> Option<&CandidateAddress> {
        self.remote_address.as_ref()
    }

    /// Local address the socket is bound to
    pub fn local_address(&self) -> Option<&SockAddr> {
        self.local_address.as_ref()
    }

    /// Replace the notice callback, returning the previous one
    pub fn set_notice_processor(&mut self, processor: NoticeProcessor) -> NoticeProcessor {
        self.session.set_notice_processor(processor)
    }

    /// Replace the reader used between AuthenticationOk and ReadyForQuery
    pub fn set_result_reader(&mut self, reader: Box<dyn ResultReader>) {
        self.reader = reader;
    }

    /// Everything needed to cancel a running request later, from any thread
    ///
    /// `None` until the connection is established and the server sent its key.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        if self.status != ConnectionStatus::Ok {
            return None;
        }
        let address = self.remote_address.as_ref()?;
        CancelToken::new(
            address,
            self.session.backend_pid()?,
            self.session.secret_key()?,
        )
        .ok()
    }

    /// Bumped every time a new socket replaces the previous one
    pub(crate) fn socket_generation(&self) -> u64 {
        self.socket_generation
    }

    /// `connect_timeout` deadline of the current attempt, fixed before its first step
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conninfo::{resolve, ResolveContext};
    use std::net::{SocketAddr, TcpListener};
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    fn params(conninfo: &str) -> ConnectionParameters {
        resolve(conninfo, &ResolveContext::new().with_os_user("alice")).unwrap()
    }

    /// Socket whose pending `SO_ERROR` is a reset, as after a deferred connect failure
    fn socket_with_pending_error() -> (Socket, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let socket = Socket::new(socket2::Domain::IPV4, Type::STREAM, None).unwrap();
        socket.connect(&SockAddr::from(addr)).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        socket2::SockRef::from(&accepted)
            .set_linger(Some(Duration::ZERO))
            .unwrap();
        drop(accepted);
        socket.set_nonblocking(true).unwrap();
        thread::sleep(Duration::from_millis(50));
        (socket, addr)
    }

    /// Put a handle in `Connecting` on the first of `candidates`
    fn connecting(candidates: Vec<CandidateAddress>, socket: Socket) -> Connection {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = Connection::start_with_candidates(
            params("dbname=test allowssl=0"),
            vec![CandidateAddress::Unix(dir.path().join(".s.PGSQL.5432"))],
        );
        conn.status = ConnectionStatus::Connecting;
        conn.candidates = candidates;
        conn.candidate_index = 0;
        conn.transport = Some(Transport::Plain(socket));
        conn
    }

    #[test]
    fn test_deferred_connect_failure_moves_to_next_candidate() {
        let (socket, first) = socket_with_pending_error();
        let second: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut conn = connecting(
            vec![CandidateAddress::Inet(first), CandidateAddress::Inet(second)],
            socket,
        );

        let step = conn.finish_connect().unwrap();
        assert!(matches!(step, Step::Advance(ConnectionStatus::Init)));
        assert_eq!(conn.candidate_index, 1);
        assert!(conn.socket().is_none());
    }

    #[test]
    fn test_deferred_connect_failure_on_last_candidate() {
        let (socket, only) = socket_with_pending_error();
        let mut conn = connecting(vec![CandidateAddress::Inet(only)], socket);

        let err = conn.finish_connect().unwrap_err();
        let Error::Connect(text) = err else {
            panic!("expected a connect error");
        };
        assert!(text.starts_with("could not connect to server: "));
        assert!(text.contains(&format!("TCP/IP connections on port {}?", only.port())));
        assert_eq!(conn.candidate_index, 0);
    }

    #[test]
    fn test_deadline_fixed_before_first_step() {
        let dir = tempfile::tempdir().unwrap();
        let before = Instant::now();
        let conn = Connection::start_with_candidates(
            params("dbname=test connect_timeout=10"),
            vec![CandidateAddress::Unix(dir.path().join(".s.PGSQL.5432"))],
        );
        let after = Instant::now();

        let deadline = conn.deadline().unwrap();
        assert!(deadline >= before + Duration::from_secs(10));
        assert!(deadline <= after + Duration::from_secs(10));

        let conn = Connection::start_with_candidates(
            params("dbname=test"),
            vec![CandidateAddress::Unix(dir.path().join(".s.PGSQL.5432"))],
        );
        assert!(conn.deadline().is_none());
    }

    #[test]
    fn test_empty_candidate_list_fails() {
        let conn = Connection::start_with_candidates(params("dbname=test"), Vec::new());
        assert_eq!(conn.status(), ConnectionStatus::Bad);
        assert!(matches!(
            conn.last_error(),
            Some(Error::AddressResolution(_))
        ));
        assert!(conn.error_message().ends_with('\n'));
        assert!(conn.socket().is_none());
    }

    #[test]
    fn test_missing_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".s.PGSQL.5432");
        let mut conn = Connection::start_with_candidates(
            params("dbname=test"),
            vec![CandidateAddress::Unix(path.clone())],
        );

        assert_eq!(conn.status(), ConnectionStatus::Bad);
        assert_eq!(conn.connect_poll(), PollingStatus::Failed);
        assert!(matches!(conn.last_error(), Some(Error::Connect(_))));
        let message = conn.error_message();
        assert!(message.starts_with("could not connect to server: "));
        assert!(message.contains("Unix domain socket"));
        assert!(message.contains(&path.display().to_string()));
        assert!(conn.remote_address().is_none());
        assert!(conn.cancel_token().is_none());
    }

    #[test]
    fn test_tcp_failure_wording() {
        let conn = Connection::start_with_candidates(
            params("host=db.internal port=6543"),
            vec![CandidateAddress::Unix(PathBuf::from("/nonexistent/.s.PGSQL.6543"))],
        );
        let err = io::Error::from_raw_os_error(libc::ECONNREFUSED);
        let message = conn.connect_failure_message(
            &CandidateAddress::Inet("10.0.0.1:6543".parse().unwrap()),
            &err,
        );
        assert!(message.starts_with("could not connect to server: "));
        assert!(message.contains("Is the server running on host \"db.internal\" and accepting"));
        assert!(message.ends_with("TCP/IP connections on port 6543?"));
    }

    #[test]
    fn test_accessors() {
        let conn = Connection::start_with_candidates(
            params("host=db.internal port=6543 dbname=shop user=bob password=pw options='-c geqo=off'"),
            Vec::new(),
        );
        assert_eq!(conn.db(), Some("shop"));
        assert_eq!(conn.user(), Some("bob"));
        assert_eq!(conn.password(), "pw");
        assert_eq!(conn.host(), Some("db.internal"));
        assert_eq!(conn.port(), "6543");
        assert_eq!(conn.tty(), "");
        assert_eq!(conn.options(), "-c geqo=off");
        assert_eq!(conn.backend_pid(), None);
        assert!(!conn.is_tls());
    }

    #[test]
    fn test_reset_keeps_parameters_and_clears_errors() {
        let mut conn = Connection::start_with_candidates(
            params("dbname=test"),
            vec![CandidateAddress::Unix(PathBuf::from("/nonexistent/.s.PGSQL.5432"))],
        );
        assert_eq!(conn.status(), ConnectionStatus::Bad);
        let first = conn.error_message().to_string();

        conn.reset_start().unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Bad);
        assert_eq!(conn.error_message(), first);
        assert_eq!(conn.db(), Some("test"));
    }

    #[test]
    fn test_notice_processor_is_swappable() {
        let mut conn = Connection::start_with_candidates(params(""), Vec::new());
        let previous = conn.set_notice_processor(Box::new(|_| {}));
        let _ = conn.set_notice_processor(previous);
    }
}
