//! Session Client
//!
//! The event loop that ties everything together. A single task owns the
//! [`Session`], the live [`Connection`] and both timers, and reacts to:
//!
//! ```text
//!   SessionCommand ──┐
//!   TransportEvent ──┤
//!   fetch results  ──┼──▶ SessionClient::run ──▶ watch<SessionView>
//!   reconnect due  ──┤                       └─▶ mpsc<Notification>
//!   countdown tick ──┘
//! ```
//!
//! Connection attempts and REST calls run in spawned tasks and report back
//! through an internal channel. Each result carries the generation (for
//! connects) or login epoch (for fetches) it was started under, so results
//! that arrive after a teardown are discarded instead of resurrecting state.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, Credentials};
use crate::config::ClientConfig;
use crate::confirmation::ConfirmationGate;
use crate::connection::{
    CloseDisposition, ClosePolicy, ConnectionManager, ConnectionStatus, ABNORMAL_CLOSE_CODE,
    AUTH_FAILED_MESSAGE, SUPERSEDED_MESSAGE,
};
use crate::dispatcher::{Dispatcher, Effect, Notification};
use crate::events::SessionCommand;
use crate::history::{HistoryRecord, SessionHistoryLoader};
use crate::messages::SessionId;
use crate::protocol::{self, ClientFrame};
use crate::session::{ChatMessage, DecodeDiagnostics, Session};
use crate::snapshot::{DatasetSummary, Location, SnapshotPublisher};
use crate::timer::{CountdownTicker, ReconnectTimer};
use crate::transport::{ws_url, Connection, Connector, TransportError, TransportEvent};

/// Capacity of the internal completion channel
const INTERNAL_BUFFER: usize = 32;

/// Capacity of the notification channel
const NOTIFICATION_BUFFER: usize = 32;

/// Errors returned by [`SessionHandle`]
#[derive(Debug, Error)]
pub enum SessionError {
    /// The client event loop has stopped
    #[error("session client has shut down")]
    Closed,
}

/// Read-only picture of the session published after every event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionView {
    /// Whether credentials are present
    pub logged_in: bool,
    /// Server session id from the last handshake
    pub session_id: Option<SessionId>,
    /// Whether the server reported an available assistant
    pub assistant_available: bool,
    /// Connection status and reconnect countdown
    pub connection: ConnectionStatus,
    /// Transcript
    pub messages: Vec<ChatMessage>,
    /// Whether a response is in flight
    pub is_streaming: bool,
    /// Current location
    pub location: Location,
    /// Whether the chat panel is visible
    pub panel_open: bool,
    /// Cached dataset summaries
    pub datasets: Vec<DatasetSummary>,
    /// Frame decoding counters
    pub diagnostics: DecodeDiagnostics,
}

impl SessionView {
    fn capture(session: &Session, logged_in: bool) -> Self {
        Self {
            logged_in,
            session_id: session.id.clone(),
            assistant_available: session.assistant_available,
            connection: session.connection.status(),
            messages: session.messages.as_slice().to_vec(),
            is_streaming: session.is_streaming(),
            location: session.location.clone(),
            panel_open: session.panel_open,
            datasets: session.datasets.clone(),
            diagnostics: session.diagnostics,
        }
    }
}

/// UI-side handle to a running [`SessionClient`]
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    notifications: mpsc::Receiver<Notification>,
}

impl SessionHandle {
    /// Queue a command
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Start a session with `credentials`
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn login(&self, credentials: Credentials) -> Result<(), SessionError> {
        self.send(SessionCommand::Login(credentials)).await
    }

    /// End the session
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Logout).await
    }

    /// Send a user message
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SendText(text.into())).await
    }

    /// Stop the in-flight response
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop).await
    }

    /// Dismiss a nudge
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn dismiss_nudge(
        &self,
        nudge_id: impl Into<String>,
        permanent: bool,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::DismissNudge {
            nudge_id: nudge_id.into(),
            permanent,
        })
        .await
    }

    /// Approve a pending tool action
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn approve(&self, confirm_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::Approve {
            confirm_id: confirm_id.into(),
        })
        .await
    }

    /// Report a route change
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn navigate(&self, location: Location) -> Result<(), SessionError> {
        self.send(SessionCommand::Navigate(location)).await
    }

    /// Report chat panel visibility
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client has stopped.
    pub async fn set_panel_open(&self, open: bool) -> Result<(), SessionError> {
        self.send(SessionCommand::SetPanelOpen(open)).await
    }

    /// Stop the client
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client already stopped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest published view
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Independent receiver for view updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait for the next published view
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] once the client has stopped.
    pub async fn changed(&mut self) -> Result<SessionView, SessionError> {
        self.view.changed().await.map_err(|_| SessionError::Closed)?;
        Ok(self.view.borrow_and_update().clone())
    }

    /// Wait until a published view satisfies `pred`
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] if the client stops first.
    pub async fn wait_for<F>(&mut self, pred: F) -> Result<SessionView, SessionError>
    where
        F: FnMut(&SessionView) -> bool,
    {
        let view = self
            .view
            .wait_for(pred)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(SessionView::clone(&view))
    }

    /// Next notification raised while the chat panel was closed
    pub async fn next_notification(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }

    /// Notification already queued, if any
    pub fn try_notification(&mut self) -> Option<Notification> {
        self.notifications.try_recv().ok()
    }
}

/// Results reported back to the event loop by spawned tasks
enum Internal {
    Opened {
        generation: u64,
        result: Result<Connection, TransportError>,
    },
    HistoryLoaded {
        epoch: u64,
        result: Result<Vec<HistoryRecord>, ApiError>,
    },
    DatasetsRefreshed {
        epoch: u64,
        result: Result<Vec<DatasetSummary>, ApiError>,
    },
}

/// Persistent session client
///
/// Create with [`SessionClient::new`], spawn [`SessionClient::run`], and
/// drive it through the returned [`SessionHandle`].
pub struct SessionClient<C, A> {
    connector: Arc<C>,
    api: Arc<A>,
    api_origin: String,
    ws_path: String,
    policy: ClosePolicy,

    session: Session,
    dispatcher: Dispatcher,
    history: SessionHistoryLoader,
    credentials: Option<Credentials>,
    connection: Option<Connection>,
    generation: u64,
    epoch: u64,

    reconnect: ReconnectTimer,
    countdown: CountdownTicker,

    commands: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    view_tx: watch::Sender<SessionView>,
    notify_tx: mpsc::Sender<Notification>,
}

impl<C, A> SessionClient<C, A>
where
    C: Connector,
    A: ApiClient + 'static,
{
    /// Create a client and its handle
    #[must_use]
    pub fn new(config: &ClientConfig, connector: C, api: A) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.session.command_buffer.max(1));
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_BUFFER);
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_BUFFER);

        let policy = config.connection.close_policy();
        let session = Session::new(ConnectionManager::new(policy));
        let (view_tx, view_rx) = watch::channel(SessionView::capture(&session, false));

        let client = Self {
            connector: Arc::new(connector),
            api: Arc::new(api),
            api_origin: config.connection.api_origin.clone(),
            ws_path: config.connection.ws_path.clone(),
            policy,
            session,
            dispatcher: Dispatcher::new(config.session.welcome_message.clone()),
            history: SessionHistoryLoader::new(),
            credentials: None,
            connection: None,
            generation: 0,
            epoch: 0,
            reconnect: ReconnectTimer::new(),
            countdown: CountdownTicker::new(),
            commands: command_rx,
            internal_tx,
            internal_rx,
            view_tx,
            notify_tx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            view: view_rx,
            notifications: notify_rx,
        };
        (client, handle)
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Session client started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                event = next_event(&mut self.connection) => self.handle_transport_event(event),
                () = self.reconnect.fired() => self.on_reconnect_due(),
                () = self.countdown.tick() => self.on_countdown_tick(),
            }
            self.publish_view();
        }
        self.teardown();
        self.publish_view();
        info!("Session client stopped");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(command = command.name(), "Handling command");
        match command {
            SessionCommand::Login(credentials) => self.login(credentials),
            SessionCommand::Logout => {
                info!("Logging out");
                self.teardown();
            }
            SessionCommand::Shutdown => {}
            SessionCommand::SendText(text) => self.send_text(text),
            SessionCommand::Stop => {
                if self.session.stream.request_stop() {
                    self.send_frame(ClientFrame::Stop);
                }
            }
            SessionCommand::DismissNudge {
                nudge_id,
                permanent,
            } => self.dismiss_nudge(&nudge_id, permanent),
            SessionCommand::Approve { confirm_id } => {
                match ConfirmationGate::approve(&self.session.messages, &confirm_id) {
                    Some(frame) => self.send_frame(frame),
                    None => debug!(confirm_id = %confirm_id, "No pending request to approve"),
                }
            }
            SessionCommand::Navigate(location) => {
                self.session.location = location;
                self.publish_snapshot();
            }
            SessionCommand::SetPanelOpen(open) => self.session.panel_open = open,
        }
    }

    fn login(&mut self, credentials: Credentials) {
        self.teardown();
        self.credentials = Some(credentials.clone());
        info!("Logged in; restoring history");

        if !self.history.begin() {
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = api.fetch_history(&credentials).await;
            let _ = tx.send(Internal::HistoryLoaded { epoch, result }).await;
        });
    }

    fn send_text(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        if !self.session.connection.can_send() {
            debug!("Not connected; message not sent");
            return;
        }
        match self.session.stream.begin(&mut self.session.messages, text.clone()) {
            Ok(message_id) => self.send_frame(ClientFrame::Message {
                content: text,
                message_id,
            }),
            Err(e) => debug!(error = %e, "Message not sent"),
        }
    }

    fn dismiss_nudge(&mut self, nudge_id: &str, permanent: bool) {
        let frame = {
            let target = self.session.messages.find_last_mut(|m| {
                m.nudge
                    .as_ref()
                    .is_some_and(|n| n.nudge_id == nudge_id && !n.dismissed)
            });
            let Some(info) = target.and_then(|m| m.nudge.as_mut()) else {
                debug!(nudge_id, "No such nudge to dismiss");
                return;
            };
            if !info.dismissable {
                debug!(nudge_id, "Nudge is not dismissable");
                return;
            }
            info.dismissed = true;
            ClientFrame::NudgeDismiss {
                nudge_id: info.nudge_id.clone(),
                trigger: info.trigger.clone(),
                permanent,
            }
        };
        self.send_frame(frame);
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    fn connect(&mut self) {
        let Some(credentials) = self.credentials.as_ref() else {
            debug!("No credentials; not connecting");
            return;
        };
        let url = match ws_url(&self.api_origin, &self.ws_path, credentials.token()) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Cannot build connection URL");
                self.session.connection.reset();
                return;
            }
        };
        if !self.session.connection.begin_connect() {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        info!(
            attempt = self.session.connection.status().reconnect_attempt,
            "Connecting"
        );

        let connector = Arc::clone(&self.connector);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = tx.send(Internal::Opened { generation, result }).await;
        });
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Opened { generation, result } => {
                if generation != self.generation {
                    if let Ok(conn) = result {
                        debug!(generation, "Discarding stale connection");
                        conn.close();
                    }
                    return;
                }
                match result {
                    Ok(conn) => {
                        self.connection = Some(conn);
                        self.session.connection.on_open();
                        self.reconnect.cancel();
                        self.countdown.cancel();
                        info!("Connected");
                    }
                    Err(e) => {
                        warn!(error = %e, "Connection attempt failed");
                        self.handle_close(ABNORMAL_CLOSE_CODE, &e.to_string());
                    }
                }
            }
            Internal::HistoryLoaded { epoch, result } => {
                if epoch != self.epoch {
                    return;
                }
                SessionHistoryLoader::apply(&mut self.session.messages, result);
                self.connect();
            }
            Internal::DatasetsRefreshed { epoch, result } => {
                if epoch != self.epoch {
                    return;
                }
                match result {
                    Ok(datasets) => {
                        let correct = SnapshotPublisher::needs_correction(
                            self.session.datasets.len(),
                            &datasets,
                        );
                        self.session.datasets = datasets;
                        if correct {
                            self.send_snapshot();
                        }
                    }
                    Err(e) => debug!(error = %e, "Dataset refresh failed; keeping cache"),
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => {
                let effects = self.dispatcher.handle_text(&mut self.session, &text);
                self.apply_effects(effects);
            }
            TransportEvent::Error(e) => debug!(error = %e, "Transport error"),
            TransportEvent::Closed { code, reason } => {
                self.connection = None;
                self.handle_close(code, &reason);
            }
        }
    }

    fn handle_close(&mut self, code: u16, reason: &str) {
        self.session.stream.abandon(&mut self.session.messages);

        match self.session.connection.on_close(code) {
            CloseDisposition::AuthFailed => {
                warn!(code, reason, "Authentication rejected; not reconnecting");
                self.reconnect.cancel();
                self.countdown.cancel();
                self.session.add_system_message(AUTH_FAILED_MESSAGE);
                self.session.id = None;
                self.credentials = None;
            }
            CloseDisposition::Superseded => {
                warn!(code, reason, "Session opened elsewhere; not reconnecting");
                self.reconnect.cancel();
                self.countdown.cancel();
                self.session.add_system_message(SUPERSEDED_MESSAGE);
            }
            CloseDisposition::Retry { delay, attempt } => {
                info!(
                    code,
                    reason,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Connection closed; scheduling reconnect"
                );
                self.reconnect.schedule(delay);
                self.countdown.start();
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        self.countdown.cancel();
        self.connect();
    }

    fn on_countdown_tick(&mut self) {
        match self.session.connection.tick_countdown() {
            Some(0) | None => self.countdown.cancel(),
            Some(_) => {}
        }
    }

    /// Close everything and start over with an empty session
    fn teardown(&mut self) {
        self.generation += 1;
        self.epoch += 1;
        self.reconnect.cancel();
        self.countdown.cancel();
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.credentials = None;
        self.history.reset();

        let location = std::mem::take(&mut self.session.location);
        let panel_open = self.session.panel_open;
        self.session = Session::new(ConnectionManager::new(self.policy));
        self.session.location = location;
        self.session.panel_open = panel_open;
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(frame) => self.send_frame(frame),
                Effect::PublishSnapshot => self.publish_snapshot(),
                Effect::Notify(notification) => {
                    if self.notify_tx.try_send(notification).is_err() {
                        debug!("Notification dropped");
                    }
                }
            }
        }
    }

    fn send_frame(&mut self, frame: ClientFrame) {
        if !self.session.connection.can_send() {
            debug!("Not connected; dropping outbound frame");
            return;
        }
        let Some(conn) = self.connection.as_ref() else {
            return;
        };
        match protocol::encode(&frame) {
            Ok(text) => {
                if let Err(e) = conn.send_text(text) {
                    debug!(error = %e, "Outbound frame dropped");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode outbound frame"),
        }
    }

    /// Send a snapshot from the cache now, then refresh the cache
    fn publish_snapshot(&mut self) {
        self.send_snapshot();

        let Some(credentials) = self.credentials.clone() else {
            return;
        };
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = api.list_datasets(&credentials).await;
            let _ = tx.send(Internal::DatasetsRefreshed { epoch, result }).await;
        });
    }

    fn send_snapshot(&mut self) {
        let snapshot = SnapshotPublisher::build(&self.session.location, &self.session.datasets);
        self.send_frame(ClientFrame::StateSnapshot(snapshot));
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(SessionView::capture(
            &self.session,
            self.credentials.is_some(),
        ));
    }
}

async fn next_event(connection: &mut Option<Connection>) -> TransportEvent {
    match connection {
        Some(conn) => conn.recv().await,
        None => std::future::pending().await,
    }
}
