//! Connection lifecycle, subscription commands and fan-out.
//!
//! Each connection moves `Handshaking → Authenticated → Closed`. Only an
//! authenticated connection may issue commands. Closing unregisters the
//! connection but leaves the identity's subscriptions in place.
//!
//! Fan-out serializes the event once and pushes the same frame to every live
//! connection of every recipient without waiting on any of them.

use std::sync::Arc;

use metrics::{counter, histogram};
use parking_lot::{Mutex, RwLock};
use parley_core::{ConnectionId, ConversationRef, IdentityId, Message, PanelId, Principal, SessionId};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{AuthenticationProvider, ConversationDirectory};
use crate::connection::ClientConnection;
use crate::errors::{RealtimeError, Result};
use crate::metrics::{
    DISTRIBUTION_RECIPIENTS, DISTRIBUTIONS_TOTAL, HANDSHAKES_REFUSED_TOTAL,
    PUSHES_DELIVERED_TOTAL, PUSHES_DROPPED_TOTAL, SUBSCRIPTION_COMMANDS_TOTAL,
};
use crate::protocol::{
    Ack, CONNECTION_ESTABLISHED, Command, ConnectionEstablished, EventEnvelope, MessageEvent,
    MessagePayload, PANEL_MESSAGE, SESSION_MESSAGE, SenderInfo, Targets,
};
use crate::registry::ConnectionRegistry;
use crate::resolver::{RecipientResolver, RoutingDecision};
use crate::subscriptions::SubscriptionIndex;

/// Per-connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Credential not yet verified.
    Handshaking,
    /// Verified; commands accepted.
    Authenticated,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Handshaking, Self::Authenticated | Self::Closed)
                | (Self::Authenticated, Self::Closed)
        )
    }
}

/// An authenticated connection as seen by the engine.
pub struct ConnectionHandle {
    connection: Arc<ClientConnection>,
    principal: Principal,
    state: Mutex<ConnectionState>,
}

impl ConnectionHandle {
    fn new(connection: Arc<ClientConnection>, principal: Principal) -> Self {
        Self {
            connection,
            principal,
            state: Mutex::new(ConnectionState::Handshaking),
        }
    }

    /// The underlying push endpoint.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.connection.id
    }

    /// Verified principal.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Owning identity.
    pub fn identity(&self) -> &IdentityId {
        &self.principal.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn transition(&self, next: ConnectionState) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(RealtimeError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.connection.id)
            .field("identity", &self.principal.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Outcome of one distribution call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionReport {
    /// Recipients and rationale.
    pub decision: RoutingDecision,
    /// Live connections targeted.
    pub connections: usize,
    /// Frames enqueued.
    pub delivered: usize,
    /// Frames dropped on full or closed queues.
    pub dropped: usize,
}

/// The engine: owns connections and subscriptions, and fans messages out.
///
/// Constructed stopped; [`start`](Self::start) opens it for handshakes and
/// [`stop`](Self::stop) closes every live connection. `attach` holds the
/// running flag's read lock across its registration, so a connection can
/// never be registered on an engine that `stop` has already drained.
pub struct EventDistributor {
    auth: Arc<dyn AuthenticationProvider>,
    directory: Arc<dyn ConversationDirectory>,
    connections: Arc<ConnectionRegistry>,
    subscriptions: Arc<SubscriptionIndex>,
    resolver: RecipientResolver,
    running: RwLock<bool>,
    max_connections: Option<usize>,
}

impl EventDistributor {
    /// Create a stopped engine with fresh registries.
    pub fn new(
        auth: Arc<dyn AuthenticationProvider>,
        directory: Arc<dyn ConversationDirectory>,
    ) -> Self {
        Self::with_state(
            auth,
            directory,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(SubscriptionIndex::new()),
        )
    }

    /// Create a stopped engine over existing registries.
    pub fn with_state(
        auth: Arc<dyn AuthenticationProvider>,
        directory: Arc<dyn ConversationDirectory>,
        connections: Arc<ConnectionRegistry>,
        subscriptions: Arc<SubscriptionIndex>,
    ) -> Self {
        let resolver = RecipientResolver::new(Arc::clone(&directory), Arc::clone(&subscriptions));
        Self {
            auth,
            directory,
            connections,
            subscriptions,
            resolver,
            running: RwLock::new(false),
            max_connections: None,
        }
    }

    /// Refuse handshakes beyond `limit` live connections.
    #[must_use]
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.max_connections = Some(limit);
        self
    }

    /// Accept handshakes.
    pub fn start(&self) {
        let mut running = self.running.write();
        if !*running {
            *running = true;
            info!("realtime engine started");
        }
    }

    /// Refuse new handshakes and close every live connection.
    ///
    /// Returns the number of connections closed. Subscriptions are kept.
    pub fn stop(&self) -> usize {
        let mut running = self.running.write();
        if !*running {
            return 0;
        }
        *running = false;
        let closed = self.connections.drain().len();
        drop(running);
        info!(closed, "realtime engine stopped");
        closed
    }

    /// Whether handshakes are accepted.
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Subscription index.
    pub fn subscriptions(&self) -> &Arc<SubscriptionIndex> {
        &self.subscriptions
    }

    /// Verify `credential` and register a connection pushing into `tx`.
    ///
    /// On failure nothing is registered. On success the connection has
    /// already been sent a `connection.established` event.
    pub async fn handshake(
        &self,
        credential: &str,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Result<Arc<ConnectionHandle>> {
        let principal = self.verify(credential).await?;
        self.attach(principal, tx)
    }

    /// Verify a credential without creating a connection.
    pub async fn verify(&self, credential: &str) -> Result<Principal> {
        if !self.is_running() {
            return Err(RealtimeError::EngineStopped);
        }
        match self.auth.verify(credential).await {
            Ok(principal) => Ok(principal),
            Err(e) => {
                counter!(HANDSHAKES_REFUSED_TOTAL).increment(1);
                warn!(error = %e, "handshake refused");
                Err(e)
            }
        }
    }

    /// Register a connection for an already verified principal.
    pub fn attach(
        &self,
        principal: Principal,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Result<Arc<ConnectionHandle>> {
        let running = self.running.read();
        if !*running {
            return Err(RealtimeError::EngineStopped);
        }
        let connection = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            principal.id.clone(),
            tx,
        ));
        let handle = Arc::new(ConnectionHandle::new(Arc::clone(&connection), principal));
        handle.transition(ConnectionState::Authenticated)?;
        match self.max_connections {
            Some(limit) => {
                if !self.connections.try_register(Arc::clone(&connection), limit) {
                    counter!(HANDSHAKES_REFUSED_TOTAL).increment(1);
                    warn!(limit, identity = %handle.identity(), "connection limit reached");
                    return Err(RealtimeError::ConnectionLimit(limit));
                }
            }
            None => self.connections.register(Arc::clone(&connection)),
        }
        drop(running);

        let established = EventEnvelope::new(
            CONNECTION_ESTABLISHED,
            ConnectionEstablished {
                connection_id: connection.id.clone(),
                identity_id: handle.identity().clone(),
            },
        );
        let _ = connection.push_json(&established);
        debug!(conn_id = %connection.id, identity = %handle.identity(), "connection authenticated");
        Ok(handle)
    }

    /// Close a connection. Idempotent; subscriptions are left untouched.
    ///
    /// Returns `true` if this call performed the close.
    pub fn close(&self, handle: &ConnectionHandle) -> bool {
        if handle.transition(ConnectionState::Closed).is_err() {
            return false;
        }
        let _ = self.connections.unregister(handle.id());
        handle.connection.close();
        debug!(conn_id = %handle.id(), identity = %handle.identity(), "connection closed");
        true
    }

    /// Apply one subscription command on behalf of `handle`.
    #[instrument(skip_all, fields(method = command.method(), identity = %handle.identity()))]
    pub async fn handle_command(&self, handle: &ConnectionHandle, command: Command) -> Ack {
        let method = command.method();
        let ack = if handle.state() == ConnectionState::Authenticated {
            self.apply(handle, command).await;
            Ack::ok(None)
        } else {
            Ack::err(None, "connection is not authenticated")
        };
        let result = if ack.result { "ok" } else { "error" };
        counter!(SUBSCRIPTION_COMMANDS_TOTAL, "method" => method, "result" => result).increment(1);
        ack
    }

    async fn apply(&self, handle: &ConnectionHandle, command: Command) {
        let identity = handle.identity();
        match command {
            Command::SubscribeSession(Targets::Wildcard) => {
                let snapshot = self.directory.sessions_for_identity(identity).await;
                let added = self.subscriptions.subscribe_wildcard_session(identity, snapshot);
                debug!(added, "wildcard session subscribe");
            }
            Command::SubscribeSession(Targets::Ids(ids)) => {
                for id in ids {
                    let visible = self
                        .directory
                        .session_by_id(&id)
                        .await
                        .is_none_or(|s| s.is_participant(identity));
                    if !visible {
                        debug!(session_id = %id, "not a participant, subscription skipped");
                        continue;
                    }
                    let _ = self.subscriptions.subscribe(identity, ConversationRef::Session(id));
                }
            }
            Command::SubscribePanel(Targets::Wildcard) => {
                let snapshot: Vec<PanelId> = self
                    .directory
                    .panels_for_workspace(&handle.principal.workspace_id)
                    .await
                    .into_iter()
                    .filter(|p| p.is_visible_in(&handle.principal.workspace_id, identity))
                    .map(|p| p.id)
                    .collect();
                let added = self.subscriptions.subscribe_wildcard_panel(identity, snapshot);
                debug!(added, "wildcard panel subscribe");
            }
            Command::SubscribePanel(Targets::Ids(ids)) => {
                for id in ids {
                    let visible = self
                        .directory
                        .panel_by_id(&id)
                        .await
                        .is_none_or(|p| p.is_visible_in(&handle.principal.workspace_id, identity));
                    if !visible {
                        debug!(panel_id = %id, "panel not visible, subscription skipped");
                        continue;
                    }
                    let _ = self.subscriptions.subscribe(identity, ConversationRef::Panel(id));
                }
            }
            Command::UnsubscribeSession(ids) => {
                for id in ids {
                    let _ = self
                        .subscriptions
                        .unsubscribe(identity, &ConversationRef::Session(id));
                }
            }
            Command::UnsubscribePanel(ids) => {
                for id in ids {
                    let _ = self
                        .subscriptions
                        .unsubscribe(identity, &ConversationRef::Panel(id));
                }
            }
        }
    }

    /// Push a persisted session message to every recipient's live connections.
    #[instrument(skip_all, fields(session_id = %session, message_id = %message.id))]
    pub async fn distribute_session_message(
        &self,
        session: &SessionId,
        message: &Message,
        sender: &SenderInfo,
    ) -> DistributionReport {
        let decision = self.resolver.resolve_session(session, message).await;
        self.fan_out(SESSION_MESSAGE, session.as_str(), message, sender, decision)
    }

    /// Push a persisted panel message to every recipient's live connections.
    #[instrument(skip_all, fields(panel_id = %panel, message_id = %message.id))]
    pub async fn distribute_panel_message(
        &self,
        panel: &PanelId,
        message: &Message,
        sender: &SenderInfo,
    ) -> DistributionReport {
        let decision = self.resolver.resolve_panel(panel, message).await;
        self.fan_out(PANEL_MESSAGE, panel.as_str(), message, sender, decision)
    }

    fn fan_out(
        &self,
        kind: &'static str,
        conversation_id: &str,
        message: &Message,
        sender: &SenderInfo,
        decision: RoutingDecision,
    ) -> DistributionReport {
        counter!(DISTRIBUTIONS_TOTAL, "kind" => kind, "rationale" => decision.rationale.as_str())
            .increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!(DISTRIBUTION_RECIPIENTS).record(decision.recipients.len() as f64);

        let mut report = DistributionReport {
            decision,
            connections: 0,
            delivered: 0,
            dropped: 0,
        };
        if report.decision.recipients.is_empty() {
            debug!(rationale = %report.decision.rationale, "no recipients");
            return report;
        }

        let event = EventEnvelope::new(
            kind,
            MessageEvent {
                conversation_id: conversation_id.to_owned(),
                message: MessagePayload::from(message),
                sender: sender.clone(),
            },
        );
        let frame = match serde_json::to_string(&event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize message event");
                return report;
            }
        };

        for recipient in &report.decision.recipients {
            for conn in self.connections.connections_for(recipient) {
                report.connections += 1;
                if conn.push(Arc::clone(&frame)) {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                    warn!(conn_id = %conn.id, identity = %recipient, "push dropped");
                }
            }
        }
        counter!(PUSHES_DELIVERED_TOTAL).increment(report.delivered as u64);
        counter!(PUSHES_DROPPED_TOTAL).increment(report.dropped as u64);
        debug!(
            recipients = report.decision.recipients.len(),
            connections = report.connections,
            delivered = report.delivered,
            rationale = %report.decision.rationale,
            "message distributed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;
    use parley_core::{MessageDraft, Panel, ParticipantKind, Session, WorkspaceId};
    use serde_json::Value;

    use super::*;
    use crate::memory::{InMemoryDirectory, StaticTokenAuthenticator};

    fn idn(s: &str) -> IdentityId {
        IdentityId::from_raw(s)
    }

    fn principal(id: &str) -> Principal {
        Principal::new(id, id.to_uppercase(), ParticipantKind::Agent, "ws1")
    }

    struct Fixture {
        engine: EventDistributor,
        directory: Arc<InMemoryDirectory>,
    }

    fn fixture() -> Fixture {
        let auth = Arc::new(StaticTokenAuthenticator::new());
        for id in ["agent-1", "agent-2", "u1", "u2", "u3", "outsider"] {
            auth.insert(format!("tok-{id}"), principal(id));
        }
        auth.insert(
            "tok-spy",
            Principal::new("spy", "Spy", ParticipantKind::Human, "ws2"),
        );
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert_session(
            Session::direct(SessionId::from_raw("s1"), idn("agent-1"), idn("agent-2")).unwrap(),
        );
        directory.insert_panel(Panel::new(
            PanelId::from_raw("p1"),
            WorkspaceId::from_raw("ws1"),
            "general",
            true,
        ));
        directory.insert_panel(
            Panel::new(PanelId::from_raw("secret"), WorkspaceId::from_raw("ws1"), "secret", false)
                .with_participants([idn("u1")]),
        );
        let engine = EventDistributor::new(auth, directory.clone());
        engine.start();
        Fixture { engine, directory }
    }

    async fn connect(
        engine: &EventDistributor,
        who: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<String>>) {
        let (tx, mut rx) = mpsc::channel(16);
        let handle = engine.handshake(&format!("tok-{who}"), tx).await.unwrap();
        let hello: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(hello["type"], "connection.established");
        (handle, rx)
    }

    fn ids<T: From<String>>(list: &[&str]) -> Targets<T> {
        Targets::Ids(list.iter().map(|s| T::from((*s).to_string())).collect())
    }

    fn sender(id: &str) -> SenderInfo {
        SenderInfo::from(&principal(id))
    }

    #[tokio::test]
    async fn session_message_reaches_subscribed_participant() {
        let f = fixture();
        let (a2, mut rx2) = connect(&f.engine, "agent-2").await;
        let ack = f
            .engine
            .handle_command(&a2, Command::SubscribeSession(ids(&["s1"])))
            .await;
        assert!(ack.result);

        let msg = Message::new(
            ConversationRef::Session(SessionId::from_raw("s1")),
            idn("agent-1"),
            MessageDraft::text("hello"),
        );
        let report = f
            .engine
            .distribute_session_message(&SessionId::from_raw("s1"), &msg, &sender("agent-1"))
            .await;
        assert_eq!(report.decision.recipients.iter().collect::<Vec<_>>(), [&idn("agent-2")]);
        assert_eq!(report.delivered, 1);

        let event: Value = serde_json::from_str(&rx2.recv().await.unwrap()).unwrap();
        assert_eq!(event["type"], "session-message");
        assert_eq!(event["data"]["conversationId"], "s1");
        assert_eq!(event["data"]["message"]["content"], "hello");
        assert_eq!(event["data"]["sender"]["id"], "agent-1");
    }

    #[tokio::test]
    async fn every_connection_of_a_recipient_gets_the_same_frame() {
        let f = fixture();
        let (_c1, mut rx1) = connect(&f.engine, "agent-2").await;
        let (_c2, mut rx2) = connect(&f.engine, "agent-2").await;
        let msg = Message::new(
            ConversationRef::Session(SessionId::from_raw("s1")),
            idn("agent-1"),
            MessageDraft::text("both"),
        );
        let report = f
            .engine
            .distribute_session_message(&SessionId::from_raw("s1"), &msg, &sender("agent-1"))
            .await;
        assert_eq!(report.connections, 2);
        assert_eq!(rx1.recv().await.unwrap(), rx2.recv().await.unwrap());
    }

    #[tokio::test]
    async fn failed_handshake_creates_nothing() {
        let f = fixture();
        let (tx, _rx) = mpsc::channel(4);
        assert_matches!(
            f.engine.handshake("bogus", tx).await,
            Err(RealtimeError::AuthenticationFailure(_))
        );
        assert_eq!(f.engine.connections().connection_count(), 0);
    }

    #[tokio::test]
    async fn stopped_engine_refuses_and_drains() {
        let f = fixture();
        let (handle, _rx) = connect(&f.engine, "u1").await;
        assert_eq!(f.engine.stop(), 1);
        assert!(handle.connection().is_closed());
        assert!(!f.engine.is_running());

        let (tx, _rx2) = mpsc::channel(4);
        assert_matches!(
            f.engine.handshake("tok-u1", tx).await,
            Err(RealtimeError::EngineStopped)
        );
        assert_eq!(f.engine.stop(), 0);
    }

    #[tokio::test]
    async fn subscriptions_survive_close() {
        let f = fixture();
        let (handle, _rx) = connect(&f.engine, "u1").await;
        let _ = f
            .engine
            .handle_command(&handle, Command::SubscribePanel(ids(&["p1"])))
            .await;
        assert!(f.engine.close(&handle));
        assert!(!f.engine.close(&handle));
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(!f.engine.connections().is_online(&idn("u1")));
        assert!(f
            .engine
            .subscriptions()
            .is_subscribed(&idn("u1"), &ConversationRef::Panel(PanelId::from_raw("p1"))));

        let ack = f
            .engine
            .handle_command(&handle, Command::SubscribePanel(ids(&["p1"])))
            .await;
        assert!(!ack.result);
        assert!(ack.error.is_some());
    }

    #[tokio::test]
    async fn wildcard_session_is_a_snapshot() {
        let f = fixture();
        let (handle, _rx) = connect(&f.engine, "agent-1").await;
        let ack = f
            .engine
            .handle_command(&handle, Command::SubscribeSession(Targets::Wildcard))
            .await;
        assert!(ack.result);

        f.directory.insert_session(
            Session::direct(SessionId::from_raw("s2"), idn("agent-1"), idn("u1")).unwrap(),
        );
        let subs = f.engine.subscriptions().subscriptions_of(&idn("agent-1"));
        assert_eq!(subs, HashSet::from([ConversationRef::Session(SessionId::from_raw("s1"))]));
    }

    #[tokio::test]
    async fn wildcard_panel_only_covers_visible_panels() {
        let f = fixture();
        let (outsider, _rx) = connect(&f.engine, "outsider").await;
        let _ = f
            .engine
            .handle_command(&outsider, Command::SubscribePanel(Targets::Wildcard))
            .await;
        assert_eq!(
            f.engine.subscriptions().subscriptions_of(&idn("outsider")),
            HashSet::from([ConversationRef::Panel(PanelId::from_raw("p1"))])
        );

        let (insider, _rx2) = connect(&f.engine, "u1").await;
        let _ = f
            .engine
            .handle_command(&insider, Command::SubscribePanel(Targets::Wildcard))
            .await;
        assert_eq!(f.engine.subscriptions().subscriptions_of(&idn("u1")).len(), 2);
    }

    #[tokio::test]
    async fn invisible_targets_are_acked_but_not_indexed() {
        let f = fixture();
        let (outsider, _rx) = connect(&f.engine, "outsider").await;
        let ack = f
            .engine
            .handle_command(&outsider, Command::SubscribeSession(ids(&["s1", "future"])))
            .await;
        assert!(ack.result);
        let ack = f
            .engine
            .handle_command(&outsider, Command::SubscribePanel(ids(&["secret"])))
            .await;
        assert!(ack.result);
        assert_eq!(
            f.engine.subscriptions().subscriptions_of(&idn("outsider")),
            HashSet::from([ConversationRef::Session(SessionId::from_raw("future"))])
        );
    }

    #[tokio::test]
    async fn panel_mention_reaches_all_subscribers() {
        let f = fixture();
        let mut rxs = Vec::new();
        for u in ["u1", "u2", "u3"] {
            let (h, rx) = connect(&f.engine, u).await;
            let _ = f
                .engine
                .handle_command(&h, Command::SubscribePanel(ids(&["p1"])))
                .await;
            rxs.push((h, rx));
        }
        let msg = Message::new(
            ConversationRef::Panel(PanelId::from_raw("p1")),
            idn("u1"),
            MessageDraft::text("@u2 please review"),
        );
        let report = f
            .engine
            .distribute_panel_message(&PanelId::from_raw("p1"), &msg, &sender("u1"))
            .await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.decision.rationale.as_str(), "direct-mention");
        assert!(rxs[0].1.try_recv().is_err());
        assert!(rxs[1].1.try_recv().is_ok());
        assert!(rxs[2].1.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let f = fixture();
        let (u2, mut rx) = connect(&f.engine, "u2").await;
        let _ = f
            .engine
            .handle_command(&u2, Command::SubscribePanel(ids(&["p1"])))
            .await;
        let ack = f
            .engine
            .handle_command(&u2, Command::UnsubscribePanel(vec![PanelId::from_raw("p1")]))
            .await;
        assert!(ack.result);
        let ack = f
            .engine
            .handle_command(&u2, Command::UnsubscribeSession(vec![SessionId::from_raw("never")]))
            .await;
        assert!(ack.result);

        let msg = Message::new(
            ConversationRef::Panel(PanelId::from_raw("p1")),
            idn("u1"),
            MessageDraft::text("anyone?"),
        );
        let report = f
            .engine
            .distribute_panel_message(&PanelId::from_raw("p1"), &msg, &sender("u1"))
            .await;
        assert!(report.decision.recipients.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking_others() {
        let f = fixture();
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let _slow = f.engine.handshake("tok-u2", tx_slow).await.unwrap();
        let (_fast, mut rx_fast) = connect(&f.engine, "u3").await;
        for u in ["u2", "u3"] {
            let _ = f
                .engine
                .subscriptions()
                .subscribe(&idn(u), ConversationRef::Panel(PanelId::from_raw("p1")));
        }

        let msg = Message::new(
            ConversationRef::Panel(PanelId::from_raw("p1")),
            idn("u1"),
            MessageDraft::text("hi"),
        );
        let report = f
            .engine
            .distribute_panel_message(&PanelId::from_raw("p1"), &msg, &sender("u1"))
            .await;
        assert_eq!(report.connections, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert!(rx_fast.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unknown_conversation_distributes_nothing() {
        let f = fixture();
        let msg = Message::new(
            ConversationRef::Session(SessionId::from_raw("gone")),
            idn("agent-1"),
            MessageDraft::text("hello?"),
        );
        let report = f
            .engine
            .distribute_session_message(&SessionId::from_raw("gone"), &msg, &sender("agent-1"))
            .await;
        assert_eq!(report.decision, RoutingDecision::not_found());
        assert_eq!(report.connections, 0);
    }

    #[test]
    fn state_machine_transitions() {
        use ConnectionState::{Authenticated, Closed, Handshaking};
        assert!(Handshaking.can_transition_to(Authenticated));
        assert!(Handshaking.can_transition_to(Closed));
        assert!(Authenticated.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Authenticated));
        assert!(!Authenticated.can_transition_to(Handshaking));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[tokio::test]
    async fn other_workspace_cannot_subscribe_to_public_panel() {
        let f = fixture();
        let (spy, mut spy_rx) = connect(&f.engine, "spy").await;
        let p1 = ConversationRef::Panel(PanelId::from_raw("p1"));

        let ack = f
            .engine
            .handle_command(&spy, Command::SubscribePanel(ids(&["p1"])))
            .await;
        assert!(ack.result);
        assert!(!f.engine.subscriptions().is_subscribed(&idn("spy"), &p1));

        let ack = f
            .engine
            .handle_command(&spy, Command::SubscribePanel(Targets::Wildcard))
            .await;
        assert!(ack.result);
        assert!(f.engine.subscriptions().subscriptions_of(&idn("spy")).is_empty());

        let msg = Message::new(p1, idn("u1"), MessageDraft::text("internal ws1 note"));
        let report = f
            .engine
            .distribute_panel_message(&PanelId::from_raw("p1"), &msg, &sender("u1"))
            .await;
        assert!(!report.decision.recipients.contains(&idn("spy")));
        assert!(spy_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connection_limit_is_enforced_at_attach() {
        let auth = Arc::new(StaticTokenAuthenticator::new());
        auth.insert("tok", principal("u1"));
        let engine =
            EventDistributor::new(auth, Arc::new(InMemoryDirectory::new())).with_connection_limit(2);
        engine.start();

        let mut keep = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = mpsc::channel(4);
            keep.push((engine.handshake("tok", tx).await.unwrap(), rx));
        }
        let (tx, _rx) = mpsc::channel(4);
        assert_matches!(
            engine.handshake("tok", tx).await,
            Err(RealtimeError::ConnectionLimit(2))
        );
        assert_eq!(engine.connections().connection_count(), 2);

        let _ = engine.close(&keep[0].0);
        let (tx, _rx) = mpsc::channel(4);
        assert!(engine.handshake("tok", tx).await.is_ok());
    }

    #[test]
    fn stop_racing_attach_leaves_nothing_registered() {
        for _ in 0..20 {
            let auth = Arc::new(StaticTokenAuthenticator::new());
            let engine = Arc::new(EventDistributor::new(auth, Arc::new(InMemoryDirectory::new())));
            engine.start();

            let attachers: Vec<_> = (0..4)
                .map(|_| {
                    let engine = Arc::clone(&engine);
                    std::thread::spawn(move || {
                        let mut attached = Vec::new();
                        for _ in 0..200 {
                            let (tx, _rx) = mpsc::channel(1);
                            if let Ok(handle) = engine.attach(principal("u1"), tx) {
                                attached.push(handle);
                            }
                        }
                        attached
                    })
                })
                .collect();
            std::thread::yield_now();
            let _ = engine.stop();

            let attached: Vec<_> = attachers
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            assert!(!engine.is_running());
            assert_eq!(engine.connections().connection_count(), 0);
            assert!(attached.iter().all(|h| h.connection().is_closed()));
        }
    }
}
