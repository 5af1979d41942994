// src/session.rs
// One participant process: a single event loop that owns the state machines.
//
// Channel callbacks, call timers and discovery timeouts never touch state
// directly. They push a `SessionEvent` into the participant's queue and the
// loop applies it, so every transition happens on one logical thread.
// Front-end commands arrive on a separate queue that only `SessionHandle`s
// feed; when the last handle is dropped the loop ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

use crate::channel::{Channel, LocalChannel, LocalHub};
use crate::client::{
    Announcer, ClientState, GameClient, SilentAnnouncer, DEFAULT_CLAIM_DEBOUNCE, DEFAULT_DISCOVERY_TIMEOUT,
};
use crate::config::SessionConfig;
use crate::defs::Number;
use crate::error::BingoResult;
use crate::game::GameState;
use crate::identity::Identity;
use crate::logging::{log_debug, log_info, log_warning};
use crate::message::Envelope;
use crate::server::GameServer;

#[derive(Debug)]
pub enum SessionEvent {
    Inbound(Envelope),
    Tick { generation: u64 },
    DiscoveryTimeout,
    ClaimCooldownOver,
    StartGame { tick_interval: Duration },
    NumberClicked(Number),
    ClaimBingo,
    SetSound(bool),
    Notice(SessionNotice),
    Shutdown,
}

/// Things the state machines report through their callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    NoHostFound,
    GameAlreadyStarted,
    HostRejected(String),
}

/// What a front end needs to draw this participant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientView {
    pub client: ClientState,
    pub server_state: Option<GameState>,
    pub hosting: bool,
    /// A claim would be accepted by this client right now
    pub can_claim: bool,
    pub sound_enabled: bool,
    pub notices: Vec<SessionNotice>,
}

pub struct ParticipantOptions {
    pub host: bool,
    pub automark: bool,
    pub discovery_timeout: Duration,
    pub claim_debounce: Duration,
    pub announcer: Box<dyn Announcer>,
}

impl Default for ParticipantOptions {
    fn default() -> Self {
        Self {
            host: false,
            automark: false,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            claim_debounce: DEFAULT_CLAIM_DEBOUNCE,
            announcer: Box::new(SilentAnnouncer),
        }
    }
}

impl ParticipantOptions {
    pub fn from_config(config: &SessionConfig, host: bool) -> Self {
        Self {
            host,
            automark: config.automark,
            discovery_timeout: config.discovery_timeout(),
            claim_debounce: config.claim_debounce(),
            ..Self::default()
        }
    }
}

impl Announcer for Box<dyn Announcer> {
    fn announce(&mut self, text: &str) {
        (**self).announce(text);
    }
}

/// Command side of a running participant. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    identity: Identity,
    commands: UnboundedSender<SessionEvent>,
    view: watch::Receiver<ClientView>,
}

impl SessionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn start_game(&self, tick_interval: Duration) {
        self.post(SessionEvent::StartGame { tick_interval });
    }

    pub fn click_number(&self, number: Number) {
        self.post(SessionEvent::NumberClicked(number));
    }

    pub fn claim_bingo(&self) {
        self.post(SessionEvent::ClaimBingo);
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.post(SessionEvent::SetSound(enabled));
    }

    pub fn shutdown(&self) {
        self.post(SessionEvent::Shutdown);
    }

    pub fn view(&self) -> ClientView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `condition`. `None` once the session has ended.
    pub async fn wait_for<F>(&mut self, mut condition: F) -> Option<ClientView>
    where
        F: FnMut(&ClientView) -> bool,
    {
        self.view.wait_for(|view| condition(view)).await.ok().map(|view| view.clone())
    }

    fn post(&self, event: SessionEvent) {
        if self.commands.send(event).is_err() {
            log_debug(&format!("Session of {} has already ended", self.identity));
        }
    }
}

pub struct Participant<C: Channel> {
    identity: Identity,
    server: Option<GameServer<C>>,
    client: GameClient<C>,
    events: UnboundedReceiver<SessionEvent>,
    commands: UnboundedReceiver<SessionEvent>,
    view: watch::Sender<ClientView>,
    notices: Vec<SessionNotice>,
}

impl Participant<LocalChannel> {
    /// Join `game_id` on an in-process hub. A host offers to host before its
    /// own client announces itself, so it ends up in its own player list.
    pub fn join_local(
        hub: &LocalHub,
        identity: Identity,
        game_id: &str,
        options: ParticipantOptions,
    ) -> BingoResult<(Self, SessionHandle)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inbound = tx.clone();
        let channel = Arc::new(LocalChannel::new(hub.clone(), move |envelope| {
            let _ = inbound.send(SessionEvent::Inbound(envelope));
        }));
        Self::join(identity, game_id, channel, (tx, rx), options)
    }
}

impl<C: Channel> Participant<C> {
    pub fn join(
        identity: Identity,
        game_id: &str,
        channel: Arc<C>,
        (tx, rx): (UnboundedSender<SessionEvent>, UnboundedReceiver<SessionEvent>),
        options: ParticipantOptions,
    ) -> BingoResult<(Self, SessionHandle)> {
        let server = if options.host {
            let notify = tx.clone();
            let mut server = GameServer::new(identity.clone(), game_id, Arc::clone(&channel), tx.clone())
                .with_automark(options.automark)
                .on_host_rejection(move |reason| {
                    let _ = notify.send(SessionEvent::Notice(SessionNotice::HostRejected(reason.to_string())));
                });
            server.connect()?;
            Some(server)
        } else {
            None
        };

        let no_host = tx.clone();
        let already_started = tx.clone();
        let mut client = GameClient::new(identity.clone(), game_id, channel, tx.clone())
            .with_discovery_timeout(options.discovery_timeout)
            .with_claim_debounce(options.claim_debounce)
            .with_announcer(options.announcer)
            .on_no_host_found(move || {
                let _ = no_host.send(SessionEvent::Notice(SessionNotice::NoHostFound));
            })
            .on_game_already_started(move || {
                let _ = already_started.send(SessionEvent::Notice(SessionNotice::GameAlreadyStarted));
            });
        client.connect()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ClientView::default());
        let participant = Participant {
            identity: identity.clone(),
            server,
            client,
            events: rx,
            commands: command_rx,
            view: view_tx,
            notices: Vec::new(),
        };
        participant.publish();

        let handle = SessionHandle {
            identity,
            commands: command_tx,
            view: view_rx,
        };
        Ok((participant, handle))
    }

    pub fn is_hosting(&self) -> bool {
        self.server.is_some()
    }

    /// Process events until shutdown or until every handle is gone.
    pub async fn run(mut self) {
        loop {
            // Queued channel traffic and timers go before commands
            let event = tokio::select! {
                biased;
                Some(event) = self.events.recv() => event,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => {
                        log_debug(&format!("All handles of {} dropped", self.identity));
                        break;
                    }
                },
            };
            if !self.handle_event(event) {
                break;
            }
            self.publish();
        }
        if let Some(server) = self.server.as_mut() {
            server.stop();
        }
        self.publish();
        log_debug(&format!("Session of {} ended", self.identity));
    }

    /// Apply one event. Returns false when the session should end.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Inbound(envelope) => self.dispatch(&envelope),
            SessionEvent::Tick { generation } => {
                if let Some(server) = self.server.as_mut() {
                    server.handle_tick(generation);
                }
            }
            SessionEvent::DiscoveryTimeout => self.client.on_discovery_timeout(),
            SessionEvent::ClaimCooldownOver => self.client.on_claim_cooldown_over(),
            SessionEvent::StartGame { tick_interval } => match self.server.as_mut() {
                Some(server) => server.start(tick_interval),
                None => log_warning(&format!("{} is not hosting, cannot start a game", self.identity)),
            },
            SessionEvent::NumberClicked(number) => self.client.record_number_clicked(number),
            SessionEvent::ClaimBingo => {
                self.client.claim_bingo();
            }
            SessionEvent::SetSound(enabled) => self.client.set_sound_enabled(enabled),
            SessionEvent::Notice(notice) => self.notices.push(notice),
            SessionEvent::Shutdown => return false,
        }
        true
    }

    fn dispatch(&mut self, envelope: &Envelope) {
        if !envelope.is_for(&self.identity.client_id) {
            return;
        }

        if let Some(server) = self.server.as_mut() {
            server.on_receive_message(envelope);
            if server.has_abdicated() {
                log_info(&format!("{} stops hosting", self.identity));
                self.server = None;
            }
        }
        self.client.on_receive_message(envelope);
    }

    fn publish(&self) {
        self.view.send_replace(ClientView {
            client: self.client.state().clone(),
            server_state: self.client.server_state().cloned(),
            hosting: self.server.is_some(),
            can_claim: self.client.can_claim_bingo(),
            sound_enabled: self.client.is_sound_enabled(),
            notices: self.notices.clone(),
        });
    }
}
