//! AmiClient: owns one manager-interface connection and drives the protocol.
//!
//! # Architecture
//!
//! ```text
//!  send()/call() ── any task ──► Correlator.register ─► writer lock ─► socket
//!
//!  run() ── one task ──► process() ─► reader lock
//!                          │
//!                          ├─ FrameSplitter.feed ─► frames
//!                          └─ classify
//!                               ├─ Response ─► list head?  ListAggregator.open
//!                               │              otherwise   Correlator.resolve
//!                               ├─ Event ────► ListAggregator.offer
//!                               │                 ├─ Completed ─► Correlator.resolve
//!                               │                 └─ Unclaimed ─► Dispatcher.dispatch
//!                               └─ Malformed ► MalformedFramePolicy
//! ```
//!
//! The read half (with the frame splitter and the list aggregator) and the
//! write half sit behind separate async locks, so a write blocked on
//! backpressure never holds up the reader.  The correlator and the dispatcher
//! have their own internal locks and are shared by both sides.
//!
//! Only one `process()` runs at a time.  Continuations and listeners run on
//! the task calling `process()` and must not call `process()` themselves.
//!
//! # States
//!
//! `Disconnected → Connecting → Authenticating → Ready → Closed`.  A transport
//! failure moves any state to `Closed` and fails every pending call with
//! [`CallError::ConnectionLost`]; a local [`AmiClient::close`] fails them with
//! [`CallError::ConnectionClosed`].  A failed `open` returns to
//! `Disconnected`, unless `close()` ran while it was in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use ami_core::domain::{
    CallError, Continuation, CorrelationError, Correlator, Dispatcher, ListAggregator, Listener,
    ListenerId, Offer,
};
use ami_core::protocol::{
    classify, ActionId, ActionMessage, EventMessage, FrameKind, FrameSplitter, FramingError,
    IncomingMessage, LoginAction, MalformedFramePolicy, ManagerBanner, ResponseMessage,
    DEFAULT_MAX_BUFFERED_BYTES, EOL, RESPONSE_EVENT,
};
use thiserror::Error;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::application::transport::{
    write_fully, Connection, Connector, TransportError, TransportRead, TransportWrite,
};

/// Error type for the client engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured scheme has no transport.
    #[error("unsupported scheme {0:?}: only \"tcp\" is supported")]
    UnsupportedScheme(String),

    /// TCP connection to the manager failed.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connection did not complete in time.
    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// The greeting line does not identify a manager interface.
    #[error("peer is not a manager interface, greeting was {banner:?}")]
    UnknownPeer { banner: String },

    /// The transport failed; fatal for the connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer sent an oversized frame; fatal for the connection.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The server answered the login with an error.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// No response arrived before the deadline.
    #[error("no response to action {action_id} within {timeout:?}")]
    Timeout { action_id: ActionId, timeout: Duration },

    /// The operation needs an open connection.
    #[error("not connected")]
    NotConnected,

    /// `open` was called on a connection that is already up.
    #[error("already connected")]
    AlreadyConnected,

    /// The action identifier is already pending.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The pending call was failed by the connection.
    #[error("call failed: {0}")]
    Call(#[from] CallError),
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closed,
}

/// Engine settings, usually built from the client configuration file.
#[derive(Clone)]
pub struct EngineOptions {
    /// Credentials sent on open.
    pub login: LoginAction,
    /// Substring the greeting line must contain.
    pub banner_marker: String,
    pub malformed_frame_policy: MalformedFramePolicy,
    pub max_buffered_bytes: usize,
    pub read_chunk_size: usize,
    /// Deadline for the login response.
    pub response_timeout: Duration,
}

impl EngineOptions {
    pub fn new(login: LoginAction) -> Self {
        Self {
            login,
            banner_marker: "Asterisk".to_string(),
            malformed_frame_policy: MalformedFramePolicy::Drop,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            read_chunk_size: 65_535,
            response_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("username", &self.login.username)
            .field("banner_marker", &self.banner_marker)
            .field("malformed_frame_policy", &self.malformed_frame_policy)
            .field("max_buffered_bytes", &self.max_buffered_bytes)
            .field("read_chunk_size", &self.read_chunk_size)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

/// Counts from one [`AmiClient::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub bytes_read: usize,
    pub frames: usize,
    pub empty_frames: usize,
    pub responses_resolved: usize,
    pub lists_opened: usize,
    pub list_events: usize,
    pub events_dispatched: usize,
    pub listener_failures: usize,
    pub correlation_misses: usize,
    pub malformed_dropped: usize,
    pub malformed_attached: usize,
}

/// State owned by the single reader.
struct ReadSide {
    transport: Box<dyn TransportRead>,
    splitter: FrameSplitter,
    aggregator: ListAggregator,
}

/// Asynchronous manager-interface client.
///
/// Share it behind an `Arc`: one task drives [`AmiClient::run`] while any
/// number of tasks call [`AmiClient::send`] or [`AmiClient::call`].
pub struct AmiClient {
    options: EngineOptions,
    connector: Option<Arc<dyn Connector>>,
    state: watch::Sender<ConnectionState>,
    reader: Mutex<Option<ReadSide>>,
    writer: Mutex<Option<Box<dyn TransportWrite>>>,
    correlator: Correlator,
    dispatcher: Dispatcher,
    last_action_id: StdMutex<Option<ActionId>>,
    banner: StdMutex<Option<ManagerBanner>>,
    closing: AtomicBool,
}

impl AmiClient {
    /// Creates a client that connects through `connector` on [`AmiClient::open`].
    pub fn new(options: EngineOptions, connector: Arc<dyn Connector>) -> Self {
        Self::build(options, Some(connector))
    }

    /// Creates a client without a connector; use [`AmiClient::open_with`].
    pub fn detached(options: EngineOptions) -> Self {
        Self::build(options, None)
    }

    fn build(options: EngineOptions, connector: Option<Arc<dyn Connector>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            options,
            connector,
            state,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            correlator: Correlator::new(),
            dispatcher: Dispatcher::new(),
            last_action_id: StdMutex::new(None),
            banner: StdMutex::new(None),
            closing: AtomicBool::new(false),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Connects, validates the greeting and logs in.
    ///
    /// # Errors
    ///
    /// Connection failures, [`ClientError::UnknownPeer`] for a foreign
    /// greeting, [`ClientError::LoginRejected`] or [`ClientError::Timeout`]
    /// for the login.  The client is `Disconnected` afterwards, or `Closed`
    /// with [`ClientError::NotConnected`] if [`AmiClient::close`] ran first.
    pub async fn open(&self) -> Result<ManagerBanner, ClientError> {
        let connector = self.connector.clone().ok_or(ClientError::NotConnected)?;
        self.begin_open()?;
        match connector.connect().await {
            Ok(Connection { reader, writer }) => self.handshake(reader, writer).await,
            Err(e) => {
                self.advance(ConnectionState::Connecting, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Like [`AmiClient::open`] over an already established transport.
    pub async fn open_with<R, W>(
        &self,
        reader: R,
        writer: W,
    ) -> Result<ManagerBanner, ClientError>
    where
        R: TransportRead + 'static,
        W: TransportWrite + 'static,
    {
        self.begin_open()?;
        self.handshake(Box::new(reader), Box::new(writer)).await
    }

    fn begin_open(&self) -> Result<(), ClientError> {
        let mut refused = false;
        self.state.send_if_modified(|state| match state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                *state = ConnectionState::Connecting;
                true
            }
            _ => {
                refused = true;
                false
            }
        });
        if refused {
            return Err(ClientError::AlreadyConnected);
        }
        info!("state: connecting");
        self.closing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn handshake(
        &self,
        reader: Box<dyn TransportRead>,
        writer: Box<dyn TransportWrite>,
    ) -> Result<ManagerBanner, ClientError> {
        let result = self.try_handshake(reader, writer).await;
        if let Err(e) = &result {
            warn!("open failed: {e}");
            self.reader.lock().await.take();
            self.shut_down(CallError::ConnectionLost(e.to_string())).await;
            // A close() during the handshake leaves the client `Closed`.
            if !self.closing.load(Ordering::SeqCst) {
                self.advance(ConnectionState::Closed, ConnectionState::Disconnected);
            }
        }
        result
    }

    async fn try_handshake(
        &self,
        reader: Box<dyn TransportRead>,
        writer: Box<dyn TransportWrite>,
    ) -> Result<ManagerBanner, ClientError> {
        let mut side = ReadSide {
            transport: reader,
            splitter: FrameSplitter::with_max_buffered(self.options.max_buffered_bytes),
            aggregator: ListAggregator::new(),
        };

        let line = loop {
            if let Some(line) = side.splitter.next_line()? {
                break line;
            }
            let chunk = side.transport.read_chunk(self.options.read_chunk_size).await?;
            side.splitter.push(&chunk);
        };
        let banner = ManagerBanner::parse(&line, &self.options.banner_marker)
            .ok_or(ClientError::UnknownPeer { banner: line })?;
        info!(product = banner.product(), version = ?banner.version(), "manager greeting");
        *lock(&self.banner) = Some(banner.clone());

        // close() raises `closing` before it takes the writer, so checking under
        // the writer lock either sees the close or hands it our writer.
        {
            let mut slot = self.writer.lock().await;
            if self.closing.load(Ordering::SeqCst) {
                return Err(ClientError::NotConnected);
            }
            *slot = Some(writer);
        }
        *self.reader.lock().await = Some(side);
        if !self.advance(ConnectionState::Connecting, ConnectionState::Authenticating) {
            return Err(ClientError::NotConnected);
        }

        let login: ActionMessage = self.options.login.clone().into();
        let id = login.action_id().clone();
        let (tx, mut rx) = oneshot::channel();
        let continuation: Continuation = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });

        let timeout = self.options.response_timeout;
        let outcome = time::timeout(timeout, async {
            self.send(login, continuation).await?;
            loop {
                if let Ok(outcome) = rx.try_recv() {
                    return Ok::<_, ClientError>(outcome);
                }
                self.process().await?;
            }
        })
        .await;

        let response = match outcome {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(call_error))) => return Err(ClientError::Call(call_error)),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                self.correlator.cancel(id.as_str());
                return Err(ClientError::Timeout {
                    action_id: id,
                    timeout,
                });
            }
        };
        if !response.is_success() {
            let reason = response.message().unwrap_or("login failed").to_string();
            return Err(ClientError::LoginRejected(reason));
        }

        if !self.advance(ConnectionState::Authenticating, ConnectionState::Ready) {
            return Err(ClientError::NotConnected);
        }
        Ok(banner)
    }

    /// Pumps [`AmiClient::process`] until the connection is closed locally
    /// (`Ok`) or fails (the fatal error).
    pub async fn run(&self) -> Result<(), ClientError> {
        let closed = wait_closed(self.state.subscribe());
        tokio::pin!(closed);

        let result = loop {
            tokio::select! {
                biased;
                () = &mut closed => break Ok(()),
                processed = self.process() => {
                    if let Err(e) = processed {
                        break if self.closing.load(Ordering::SeqCst) { Ok(()) } else { Err(e) };
                    }
                }
            }
        };
        self.reader.lock().await.take();
        result
    }

    /// Shuts the connection down in both directions and fails pending calls
    /// with [`CallError::ConnectionClosed`].  Idempotent.
    ///
    /// Completes even while a `send` is blocked on a peer that stopped
    /// reading: the blocked write is abandoned and returns
    /// [`TransportError::Closed`].
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) && self.state() == ConnectionState::Closed {
            return;
        }
        self.shut_down(CallError::ConnectionClosed).await;
        // The run loop releases the reader once it sees `Closed`.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Registers `continuation` and writes `action`.  Returns once the action
    /// is fully written; the continuation runs later, from `process()`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] before `open`, or after a failure;
    /// [`ClientError::Correlation`] for an identifier already pending;
    /// [`ClientError::Transport`] when the write fails, in which case the
    /// connection is torn down.
    pub async fn send(
        &self,
        action: impl Into<ActionMessage>,
        continuation: Continuation,
    ) -> Result<ActionId, ClientError> {
        let action = action.into();
        let id = action.action_id().clone();

        let mut writer = self.writer.lock().await;
        let Some(transport) = writer.as_mut() else {
            return Err(ClientError::NotConnected);
        };

        self.correlator.register(id.clone(), continuation)?;
        *lock(&self.last_action_id) = Some(id.clone());
        debug!(action = action.name(), action_id = %id, "sending\n{}", action.redacted());

        let bytes = action.serialize();
        let written = tokio::select! {
            biased;
            () = wait_closed(self.state.subscribe()) => Err(TransportError::Closed),
            result = write_fully(transport.as_mut(), bytes.as_bytes()) => result,
        };
        match written {
            Ok(()) => Ok(id),
            Err(TransportError::Closed) => {
                drop(writer);
                self.correlator.cancel(id.as_str());
                debug!(action_id = %id, "write abandoned, connection closed");
                Err(ClientError::Transport(TransportError::Closed))
            }
            Err(e) => {
                drop(writer);
                self.correlator.cancel(id.as_str());
                error!(action_id = %id, "write failed: {e}");
                let e = ClientError::Transport(e);
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Sends `action` and waits for its response.
    ///
    /// Someone must be driving [`AmiClient::run`] for the response to be
    /// read.  On timeout the pending entry is removed, so a late response is
    /// reported as a correlation miss rather than delivered.
    ///
    /// # Errors
    ///
    /// Anything [`AmiClient::send`] returns, [`ClientError::Timeout`], or
    /// [`ClientError::Call`] when the connection fails while waiting.
    pub async fn call(
        &self,
        action: impl Into<ActionMessage>,
        timeout: Duration,
    ) -> Result<ResponseMessage, ClientError> {
        let (tx, rx) = oneshot::channel();
        let id = self
            .send(
                action,
                Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                }),
            )
            .await?;

        match time::timeout(timeout, rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(call_error))) => Err(ClientError::Call(call_error)),
            Ok(Err(_)) => Err(ClientError::Call(CallError::ConnectionClosed)),
            Err(_) => {
                self.correlator.cancel(id.as_str());
                debug!(action_id = %id, "call timed out");
                Err(ClientError::Timeout {
                    action_id: id,
                    timeout,
                })
            }
        }
    }

    // ── Reading ───────────────────────────────────────────────────────────────

    /// Performs one read and routes every frame it completes.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when there is no open connection, or the
    /// fatal transport/framing error that just closed it.
    pub async fn process(&self) -> Result<ProcessReport, ClientError> {
        let mut guard = self.reader.lock().await;
        if self.state() == ConnectionState::Closed {
            guard.take();
            return Err(ClientError::NotConnected);
        }
        let Some(side) = guard.as_mut() else {
            return Err(ClientError::NotConnected);
        };

        let read = side.transport.read_chunk(self.options.read_chunk_size).await;
        let frames = read
            .map_err(ClientError::from)
            .and_then(|chunk| Ok((chunk.len(), side.splitter.feed(&chunk)?)));
        let (bytes_read, frames) = match frames {
            Ok(read) => read,
            Err(e) => {
                guard.take();
                drop(guard);
                error!("connection failed: {e}");
                self.fail(&e).await;
                return Err(e);
            }
        };

        let mut report = ProcessReport {
            bytes_read,
            ..Default::default()
        };
        for frame in frames {
            self.route(side, frame, &mut report);
        }
        Ok(report)
    }

    fn route(&self, side: &mut ReadSide, frame: String, report: &mut ProcessReport) {
        if frame.trim().is_empty() {
            debug!("skipping empty frame");
            report.empty_frames += 1;
            return;
        }
        report.frames += 1;
        debug!("received\n{frame}");

        match classify(&frame) {
            FrameKind::Response => {
                self.route_response(side, ResponseMessage::parse(&frame), report);
            }
            FrameKind::Event => self.route_event(side, EventMessage::parse(&frame), report),
            FrameKind::Malformed => self.route_malformed(side, frame, report),
        }
    }

    fn route_response(
        &self,
        side: &mut ReadSide,
        mut response: ResponseMessage,
        report: &mut ProcessReport,
    ) {
        if response.action_id().is_none()
            && self.options.malformed_frame_policy == MalformedFramePolicy::AttachToLastAction
        {
            if let Some(id) = lock(&self.last_action_id).clone() {
                debug!(action_id = %id, "response without ActionID attached to last action");
                response.incoming_mut().set_action_id(id.as_str());
            }
        }

        if response.is_list() {
            match side.aggregator.open(response) {
                Ok(()) => report.lists_opened += 1,
                Err(orphan) => self.correlation_miss(&orphan, report),
            }
            return;
        }
        self.resolve(response, report);
    }

    fn route_event(&self, side: &mut ReadSide, event: EventMessage, report: &mut ProcessReport) {
        match side.aggregator.offer(event) {
            Offer::Absorbed => report.list_events += 1,
            Offer::Completed(response) => {
                report.list_events += 1;
                self.resolve(response, report);
            }
            Offer::Unclaimed(event) => {
                let dispatched = self.dispatcher.dispatch(&event);
                report.events_dispatched += 1;
                report.listener_failures += dispatched.failed;
            }
        }
    }

    fn route_malformed(&self, side: &mut ReadSide, frame: String, report: &mut ProcessReport) {
        if self.options.malformed_frame_policy == MalformedFramePolicy::Drop {
            warn!("dropping malformed frame\n{frame}");
            report.malformed_dropped += 1;
            return;
        }

        let own_id = IncomingMessage::parse(&frame).action_id().map(str::to_string);
        let last_id = lock(&self.last_action_id).as_ref().map(|id| id.as_str().to_string());
        let target = own_id
            .into_iter()
            .chain(last_id)
            .find(|id| side.aggregator.is_open(id));
        let Some(id) = target else {
            warn!("malformed frame matches no open list, dropping\n{frame}");
            report.malformed_dropped += 1;
            return;
        };

        debug!(action_id = %id, "attaching malformed frame to open list");
        report.malformed_attached += 1;
        // Later keys win, so the target id overrides any id inside the frame.
        let raw = format!("Event: {RESPONSE_EVENT}{EOL}{frame}{EOL}ActionID: {id}");
        self.route_event(side, EventMessage::parse(&raw), report);
    }

    fn resolve(&self, response: ResponseMessage, report: &mut ProcessReport) {
        let id = response.action_id().map(str::to_string);
        if self.correlator.resolve(response) {
            report.responses_resolved += 1;
        } else {
            warn!(action_id = ?id, "response matches no pending call, dropping");
            report.correlation_misses += 1;
        }
    }

    fn correlation_miss(&self, response: &ResponseMessage, report: &mut ProcessReport) {
        warn!("response without ActionID, dropping\n{}", response.raw_content());
        report.correlation_misses += 1;
    }

    // ── Failure handling ──────────────────────────────────────────────────────

    async fn fail(&self, error: &ClientError) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.shut_down(CallError::ConnectionLost(error.to_string())).await;
    }

    /// Marks the connection `Closed`, fails pending calls, then shuts the
    /// writer down.  The state changes first: a `send` stuck in a write sees
    /// `Closed`, gives up and releases the writer lock.
    async fn shut_down(&self, reason: CallError) {
        self.set_state(ConnectionState::Closed);
        let failed = self.correlator.fail_all(reason.clone());
        if failed > 0 {
            warn!(failed, %reason, "failed pending calls");
        }
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown: {e}");
            }
        }
    }

    // ── Listeners and state ───────────────────────────────────────────────────

    /// Adds an event listener; see [`Listener`] for the accepted shapes.
    pub fn register_listener(&self, listener: Listener) -> ListenerId {
        self.dispatcher.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.unregister(id)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The greeting of the current or last connection.
    pub fn banner(&self) -> Option<ManagerBanner> {
        lock(&self.banner).clone()
    }

    pub fn pending_calls(&self) -> usize {
        self.correlator.pending_count()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Moves `from` to `to`; returns `false` if the state was no longer `from`.
    fn advance(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state != from {
                return false;
            }
            *state = to;
            true
        });
        if moved {
            info!("state: {from:?} -> {to:?}");
        }
        moved
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("state: {previous:?} -> {next:?}");
        }
    }
}

async fn wait_closed(mut state: watch::Receiver<ConnectionState>) {
    let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
