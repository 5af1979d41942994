// src/client.rs
// Participant-side state machine. Mirrors the host's state, keeps the local
// card and the numbers this participant has noticed, and sends bingo claims.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::card::Card;
use crate::channel::Channel;
use crate::defs::Number;
use crate::error::BingoResult;
use crate::game::GameState;
use crate::identity::Identity;
use crate::logging::{log_debug, log_error, log_info, log_warning};
use crate::message::{Envelope, Message};
use crate::schedule::ScheduledTask;
use crate::session::SessionEvent;

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const BINGO_ANNOUNCEMENT: &str = "Bingo!";
/// After a claim, further claims are ignored for this long.
pub const DEFAULT_CLAIM_DEBOUNCE: Duration = Duration::from_secs(5);

/// A claim needs more than this many noticed numbers (one full row).
const MIN_NOTICED_FOR_CLAIM: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    AwaitingAcknowledgement,
    Acknowledged,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientState {
    pub status: ConnectionStatus,
    pub card: Option<Card>,
    pub noticed_numbers: Vec<Number>,
    pub last_announcement: String,
    pub last_called_number: Option<Number>,
    pub game_end_reason: String,
    pub winner: Option<Identity>,
}

impl ClientState {
    /// Fresh state for a new game. Only the connection status survives.
    fn reset(&mut self) {
        *self = ClientState {
            status: self.status,
            ..ClientState::default()
        };
    }

    pub fn is_game_over(&self) -> bool {
        !self.game_end_reason.is_empty()
    }
}

/// Speaks or prints announcements. Kept outside the state machine.
pub trait Announcer: Send {
    fn announce(&mut self, text: &str);
}

pub struct SilentAnnouncer;

impl Announcer for SilentAnnouncer {
    fn announce(&mut self, _text: &str) {}
}

type Notify = Box<dyn FnMut() + Send>;

pub struct GameClient<C: Channel> {
    identity: Identity,
    game_id: String,
    channel: Arc<C>,
    events: UnboundedSender<SessionEvent>,
    state: ClientState,
    server_state: Option<GameState>,
    announcer: Box<dyn Announcer>,
    sound_enabled: bool,
    discovery_timeout: Duration,
    discovery: Option<ScheduledTask>,
    claim_available: bool,
    claim_debounce: Duration,
    claim_cooldown: Option<ScheduledTask>,
    on_no_host_found: Notify,
    on_game_already_started: Notify,
}

impl<C: Channel> GameClient<C> {
    pub fn new(identity: Identity, game_id: &str, channel: Arc<C>, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            identity,
            game_id: game_id.to_string(),
            channel,
            events,
            state: ClientState::default(),
            server_state: None,
            announcer: Box::new(SilentAnnouncer),
            sound_enabled: true,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            discovery: None,
            claim_available: true,
            claim_debounce: DEFAULT_CLAIM_DEBOUNCE,
            claim_cooldown: None,
            on_no_host_found: Box::new(|| {}),
            on_game_already_started: Box::new(|| {}),
        }
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_claim_debounce(mut self, debounce: Duration) -> Self {
        self.claim_debounce = debounce;
        self
    }

    pub fn with_announcer<A: Announcer + 'static>(mut self, announcer: A) -> Self {
        self.announcer = Box::new(announcer);
        self
    }

    pub fn on_no_host_found<F: FnMut() + Send + 'static>(mut self, callback: F) -> Self {
        self.on_no_host_found = Box::new(callback);
        self
    }

    pub fn on_game_already_started<F: FnMut() + Send + 'static>(mut self, callback: F) -> Self {
        self.on_game_already_started = Box::new(callback);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// The latest host state seen on the channel
    pub fn server_state(&self) -> Option<&GameState> {
        self.server_state.as_ref()
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
    }

    pub fn is_sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn connect(&mut self) -> BingoResult<()> {
        self.channel.connect(&self.identity, &self.game_id)?;
        self.send(Message::Connected);
        self.state.status = ConnectionStatus::AwaitingAcknowledgement;

        let events = self.events.clone();
        self.discovery = Some(ScheduledTask::once(self.discovery_timeout, move || {
            let _ = events.send(SessionEvent::DiscoveryTimeout);
        }));
        log_info(&format!("{} looking for a host in {}", self.identity, self.game_id));
        Ok(())
    }

    pub fn on_discovery_timeout(&mut self) {
        self.discovery = None;
        if self.state.status != ConnectionStatus::Acknowledged {
            log_warning(&format!("No host found for {} after {:?}", self.game_id, self.discovery_timeout));
            (self.on_no_host_found)();
        }
    }

    pub fn on_receive_message(&mut self, envelope: &Envelope) {
        if let Some(server_state) = envelope.message.server_state() {
            self.server_state = Some(server_state.clone());
        }

        match &envelope.message {
            Message::ConnectionAcknowledged { .. } => {
                self.state.status = ConnectionStatus::Acknowledged;
                if let Some(discovery) = self.discovery.take() {
                    discovery.cancel();
                }
                log_debug(&format!("{} acknowledged by host", self.identity));
            }
            Message::GameAlreadyStarted { .. } => {
                log_warning(&format!("{} is already running", self.game_id));
                (self.on_game_already_started)();
            }
            Message::NewGame { .. } => {
                self.state.reset();
            }
            Message::BingoCardIssued { card, .. } => {
                log_debug(&format!("{} received card {}", self.identity, card.id));
                self.state.card = Some(card.clone());
            }
            Message::BingoCallerMessage { server_state, text, number } => {
                self.state.last_announcement = format!("{text} - {number}");
                self.state.last_called_number = Some(*number);
                self.announce(&format!("{text}, number {number}"));
                if server_state.settings.automark {
                    self.state.noticed_numbers.push(*number);
                }
            }
            Message::Bingo { .. } => {
                self.announce(BINGO_ANNOUNCEMENT);
            }
            Message::GameComplete { reason, winner, .. } => {
                self.state.game_end_reason = reason.clone();
                self.state.winner = winner.clone();
            }
            Message::GameInfo { .. }
            | Message::HostOffer { .. }
            | Message::HostReject { .. }
            | Message::Connected
            | Message::PrizeAwarded { .. }
            | Message::Unknown => {}
        }
    }

    /// Duplicates are kept; the host only counts numbers it actually called.
    pub fn record_number_clicked(&mut self, number: Number) {
        self.state.noticed_numbers.push(number);
    }

    pub fn can_claim_bingo(&self) -> bool {
        self.claim_available && self.state.noticed_numbers.len() > MIN_NOTICED_FOR_CLAIM
    }

    /// Send the noticed numbers to the host. Ignored while the previous claim
    /// is still cooling down. Returns whether a claim went out.
    pub fn claim_bingo(&mut self) -> bool {
        if !self.claim_available {
            log_debug(&format!("{} claimed again too soon, ignored", self.identity));
            return false;
        }
        log_info(&format!(
            "{} claims bingo with {} numbers",
            self.identity,
            self.state.noticed_numbers.len()
        ));
        self.send(Message::Bingo {
            numbers: self.state.noticed_numbers.clone(),
        });

        self.claim_available = false;
        let events = self.events.clone();
        self.claim_cooldown = Some(ScheduledTask::once(self.claim_debounce, move || {
            let _ = events.send(SessionEvent::ClaimCooldownOver);
        }));
        true
    }

    pub fn on_claim_cooldown_over(&mut self) {
        self.claim_cooldown = None;
        self.claim_available = true;
    }

    fn announce(&mut self, text: &str) {
        if self.sound_enabled {
            self.announcer.announce(text);
        }
    }

    fn send(&self, message: Message) {
        let kind = message.kind();
        if let Err(e) = self.channel.send(message, None) {
            log_error(&format!("Failed to send {kind}: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardGenerator;
    use crate::channel::RecordingChannel;
    use crate::game::GameStatus;
    use crate::message::Metadata;
    use crate::prize::Prize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::sleep;

    const GAME_ID: &str = "my-cool-game";

    struct RecordingAnnouncer(Arc<Mutex<Vec<String>>>);

    impl Announcer for RecordingAnnouncer {
        fn announce(&mut self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn client() -> (GameClient<RecordingChannel>, Arc<RecordingChannel>, UnboundedReceiver<SessionEvent>) {
        let me = Identity::with_id("12345", "Player");
        let channel = Arc::new(RecordingChannel::new(&me, GAME_ID));
        let (tx, rx) = mpsc::unbounded_channel();
        (GameClient::new(me, GAME_ID, Arc::clone(&channel), tx), channel, rx)
    }

    fn host_state() -> GameState {
        GameState::new(Identity::with_id("host", "Host"), GAME_ID)
    }

    fn from_host(message: Message) -> Envelope {
        let metadata = Metadata::new(&Identity::with_id("host", "Host"), GAME_ID);
        Envelope::new(metadata, message, None)
    }

    fn call(number: Number, automark: bool) -> Envelope {
        let mut server_state = host_state();
        server_state.settings.automark = automark;
        from_host(Message::BingoCallerMessage {
            server_state,
            text: "Top of the shop".into(),
            number,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_announces_and_awaits_ack() {
        let (mut client, channel, _rx) = client();
        client.connect().unwrap();

        assert!(channel.is_connected());
        assert_eq!(channel.kinds(), ["connected"]);
        assert_eq!(client.state().status, ConnectionStatus::AwaitingAcknowledgement);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_host_found_after_timeout() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let (client, _channel, mut rx) = client();
        let mut client = client
            .with_discovery_timeout(Duration::from_secs(10))
            .on_no_host_found(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        client.connect().unwrap();

        sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::DiscoveryTimeout)));
        client.on_discovery_timeout();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledgement_disarms_discovery() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let (client, _channel, mut rx) = client();
        let mut client = client.on_no_host_found(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        client.connect().unwrap();

        client.on_receive_message(&from_host(Message::ConnectionAcknowledged { server_state: host_state() }));
        assert_eq!(client.state().status, ConnectionStatus::Acknowledged);

        sleep(DEFAULT_DISCOVERY_TIMEOUT * 2).await;
        assert!(rx.try_recv().is_err());
        // A late timeout is still harmless once acknowledged
        client.on_discovery_timeout();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_server_state_mirrored_from_any_message() {
        let (mut client, _, _rx) = client();
        let mut state = host_state();
        state.status = GameStatus::Running;
        client.on_receive_message(&from_host(Message::GameInfo { server_state: state.clone() }));
        assert_eq!(client.server_state(), Some(&state));

        // Kinds this client does nothing with still refresh the mirror
        state.prizes.award(Prize::OneLine, Identity::with_id("x", "X"));
        client.on_receive_message(&from_host(Message::PrizeAwarded {
            server_state: state.clone(),
            prize: Prize::OneLine,
            player: Identity::with_id("x", "X"),
        }));
        assert_eq!(client.server_state(), Some(&state));
    }

    #[test]
    fn test_game_already_started_invokes_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let (client, _, _rx) = client();
        let mut client = client.on_game_already_started(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        client.on_receive_message(&from_host(Message::GameAlreadyStarted { server_state: host_state() }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_card_issued_is_stored() {
        let (mut client, _, _rx) = client();
        let card = CardGenerator::new().generate();
        client.on_receive_message(&from_host(Message::BingoCardIssued {
            server_state: host_state(),
            card: card.clone(),
        }));
        assert_eq!(client.state().card.as_ref(), Some(&card));
    }

    #[test]
    fn test_call_updates_announcement() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let (client, _, _rx) = client();
        let mut client = client.with_announcer(RecordingAnnouncer(Arc::clone(&spoken)));

        client.on_receive_message(&call(90, false));

        assert_eq!(client.state().last_announcement, "Top of the shop - 90");
        assert_eq!(client.state().last_called_number, Some(90));
        assert!(client.state().noticed_numbers.is_empty());
        assert_eq!(*spoken.lock().unwrap(), ["Top of the shop, number 90"]);
    }

    #[test]
    fn test_automark_records_called_numbers() {
        let (mut client, _, _rx) = client();
        client.on_receive_message(&call(90, true));
        client.on_receive_message(&call(7, true));
        assert_eq!(client.state().noticed_numbers, [90, 7]);
    }

    #[test]
    fn test_muted_client_does_not_announce() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let (client, _, _rx) = client();
        let mut client = client.with_announcer(RecordingAnnouncer(Arc::clone(&spoken)));
        assert!(client.is_sound_enabled());
        client.set_sound_enabled(false);
        assert!(!client.is_sound_enabled());

        client.on_receive_message(&call(90, false));
        client.on_receive_message(&from_host(Message::Bingo { numbers: vec![] }));

        assert!(spoken.lock().unwrap().is_empty());
        assert_eq!(client.state().last_announcement, "Top of the shop - 90");
    }

    #[test]
    fn test_bingo_from_anyone_is_announced() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let (client, _, _rx) = client();
        let mut client = client.with_announcer(RecordingAnnouncer(Arc::clone(&spoken)));
        client.on_receive_message(&from_host(Message::Bingo { numbers: vec![1, 2, 3] }));
        assert_eq!(*spoken.lock().unwrap(), [BINGO_ANNOUNCEMENT]);
    }

    #[test]
    fn test_new_game_resets_all_but_status() {
        let (mut client, _, _rx) = client();
        client.on_receive_message(&from_host(Message::ConnectionAcknowledged { server_state: host_state() }));
        client.on_receive_message(&from_host(Message::BingoCardIssued {
            server_state: host_state(),
            card: CardGenerator::new().generate(),
        }));
        client.on_receive_message(&call(5, false));
        client.record_number_clicked(5);

        client.on_receive_message(&from_host(Message::NewGame { server_state: host_state() }));

        let state = client.state();
        assert_eq!(state.status, ConnectionStatus::Acknowledged);
        assert!(state.card.is_none());
        assert!(state.noticed_numbers.is_empty());
        assert!(state.last_announcement.is_empty());
        assert_eq!(state.last_called_number, None);
    }

    #[test]
    fn test_game_complete_records_result() {
        let (mut client, _, _rx) = client();
        let winner = Identity::with_id("w", "Winner");
        client.on_receive_message(&from_host(Message::GameComplete {
            server_state: host_state(),
            reason: "Full house".into(),
            winner: Some(winner.clone()),
        }));
        assert!(client.state().is_game_over());
        assert_eq!(client.state().game_end_reason, "Full house");
        assert_eq!(client.state().winner, Some(winner));
    }

    #[test]
    fn test_unknown_message_changes_nothing() {
        let (mut client, channel, _rx) = client();
        client.on_receive_message(&from_host(Message::Unknown));
        assert_eq!(*client.state(), ClientState::default());
        assert!(client.server_state().is_none());
        assert!(channel.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_sends_noticed_numbers_with_duplicates() {
        let (mut client, channel, _rx) = client();
        for number in [1, 2, 2, 3] {
            client.record_number_clicked(number);
        }
        assert!(!client.can_claim_bingo());
        client.record_number_clicked(4);
        assert!(client.can_claim_bingo());

        assert!(client.claim_bingo());

        let sent = channel.last().unwrap();
        assert_eq!(sent.message, Message::Bingo { numbers: vec![1, 2, 2, 3, 4] });
        assert_eq!(sent.for_client_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_claims_are_debounced() {
        let (client, channel, mut rx) = client();
        let mut client = client.with_claim_debounce(Duration::from_secs(5));
        for number in 1..=5 {
            client.record_number_clicked(number);
        }

        assert!(client.claim_bingo());
        assert!(!client.can_claim_bingo());
        assert!(!client.claim_bingo());
        assert_eq!(channel.kinds(), ["bingo"]);

        sleep(Duration::from_secs(4)).await;
        assert!(rx.try_recv().is_err());
        assert!(!client.claim_bingo());
        assert_eq!(channel.sent().len(), 1);

        sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::ClaimCooldownOver)));
        client.on_claim_cooldown_over();
        assert!(client.can_claim_bingo());

        assert!(client.claim_bingo());
        assert_eq!(channel.kinds(), ["bingo", "bingo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_allowed_below_gate() {
        // The gate only guides the front end; the host judges the claim
        let (mut client, channel, _rx) = client();
        client.record_number_clicked(1);
        assert!(!client.can_claim_bingo());
        assert!(client.claim_bingo());
        assert_eq!(channel.last().unwrap().message, Message::Bingo { numbers: vec![1] });
    }
}
