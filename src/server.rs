// src/server.rs
// Host-side state machine. Owns the authoritative GameState, drives the caller
// on a timer, issues cards, validates bingo claims and awards prizes.
//
// Host collisions are resolved "first offer wins": a host that sees somebody
// else's host-offer rejects them, and a host that is rejected abdicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::caller::{Caller, Draw};
use crate::card::{Card, CardGenerator};
use crate::channel::Channel;
use crate::defs::Number;
use crate::error::BingoResult;
use crate::game::{GameState, GameStatus};
use crate::identity::Identity;
use crate::logging::{log_debug, log_error, log_info, log_warning};
use crate::message::{Envelope, Message};
use crate::prize::{Prize, Prizes};
use crate::schedule::ScheduledTask;
use crate::session::SessionEvent;

pub const OUT_OF_NUMBERS_REASON: &str = "We ran out of numbers!";
pub const FULL_HOUSE_REASON: &str = "Full house";
pub const HOST_REJECTED_REASON: &str = "I cannot host in this channel, there is already a host!";

type RejectionCallback = Box<dyn FnMut(&str) + Send>;

pub struct GameServer<C: Channel> {
    identity: Identity,
    channel: Arc<C>,
    events: UnboundedSender<SessionEvent>,
    state: GameState,
    caller: Option<Caller>,
    generator: CardGenerator,
    player_cards: HashMap<String, Card>,
    ticker: Option<ScheduledTask>,
    tick_generation: u64,
    on_host_rejection: RejectionCallback,
    abdicated: bool,
}

impl<C: Channel> GameServer<C> {
    pub fn new(identity: Identity, game_id: &str, channel: Arc<C>, events: UnboundedSender<SessionEvent>) -> Self {
        let state = GameState::new(identity.clone(), game_id);
        Self {
            identity,
            channel,
            events,
            state,
            caller: None,
            generator: CardGenerator::new(),
            player_cards: HashMap::new(),
            ticker: None,
            tick_generation: 0,
            on_host_rejection: Box::new(|_| {}),
            abdicated: false,
        }
    }

    pub fn with_automark(mut self, automark: bool) -> Self {
        self.state.settings.automark = automark;
        self
    }

    /// Called when another host rejects this one; the process must stop hosting.
    pub fn on_host_rejection<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_host_rejection = Box::new(callback);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub fn card_for(&self, client_id: &str) -> Option<&Card> {
        self.player_cards.get(client_id)
    }

    pub fn has_abdicated(&self) -> bool {
        self.abdicated
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn connect(&mut self) -> BingoResult<()> {
        self.channel.connect(&self.identity, &self.state.settings.game_id)?;
        log_info(&format!("Offering to host: {}", self.state.game_info()));
        self.send(Message::HostOffer { server_state: self.state.clone() }, None);
        Ok(())
    }

    pub fn start(&mut self, tick_interval: Duration) {
        self.state.status = GameStatus::Running;
        self.stop();

        self.caller = Some(Caller::new());
        self.state.prizes = Prizes::new();
        self.player_cards.clear();

        self.send(Message::NewGame { server_state: self.state.clone() }, None);

        let players = self.state.players.clone();
        for player in &players {
            self.issue_card_to_player(player);
        }

        self.send_game_info();

        self.tick_generation += 1;
        let generation = self.tick_generation;
        let events = self.events.clone();
        self.ticker = Some(ScheduledTask::every(tick_interval, move || {
            events.send(SessionEvent::Tick { generation }).is_ok()
        }));

        log_info(&format!(
            "Game started with {} players, calling every {}ms",
            players.len(),
            tick_interval.as_millis()
        ));
    }

    /// Cancel the call timer. Safe to call when nothing is running.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
            log_debug("Call timer stopped");
        }
    }

    /// A tick delivered by the session. Ticks from a superseded timer, or
    /// arriving after the game stopped running, are dropped.
    pub fn handle_tick(&mut self, generation: u64) {
        if generation != self.tick_generation || self.ticker.is_none() || !self.state.is_running() {
            log_debug(&format!("Ignoring stale tick #{generation}"));
            return;
        }
        self.on_game_tick();
    }

    pub fn on_game_tick(&mut self) {
        let Some(caller) = self.caller.as_mut() else {
            return;
        };

        match caller.draw() {
            Draw::Exhausted => {
                self.end_game(None, OUT_OF_NUMBERS_REASON);
            }
            Draw::Called(call) => {
                log_debug(&format!("Calling {} - {}", call.phrase, call.number));
                self.send(
                    Message::BingoCallerMessage {
                        server_state: self.state.clone(),
                        text: call.phrase.to_string(),
                        number: call.number,
                    },
                    None,
                );
            }
        }
    }

    pub fn on_receive_message(&mut self, envelope: &Envelope) {
        match &envelope.message {
            Message::HostOffer { .. } => self.on_received_host_offer(envelope),
            Message::HostReject { .. } => self.on_received_host_rejection(),
            Message::Connected => self.on_client_connected(envelope),
            Message::Bingo { numbers } => self.on_bingo(envelope, numbers),
            Message::ConnectionAcknowledged { .. }
            | Message::GameAlreadyStarted { .. }
            | Message::NewGame { .. }
            | Message::BingoCardIssued { .. }
            | Message::BingoCallerMessage { .. }
            | Message::GameInfo { .. }
            | Message::PrizeAwarded { .. }
            | Message::GameComplete { .. }
            | Message::Unknown => {}
        }
    }

    fn on_received_host_offer(&mut self, envelope: &Envelope) {
        if self.channel.is_self_originated(envelope) {
            return;
        }
        let competitor = envelope.sender_id();
        log_warning(&format!(
            "Competing host offer from {}, rejecting it",
            envelope.metadata.identity()
        ));
        self.remove_player(competitor);
        self.send(Message::HostReject { server_state: self.state.clone() }, Some(competitor));
    }

    fn on_received_host_rejection(&mut self) {
        log_warning(HOST_REJECTED_REASON);
        self.stop();
        self.abdicated = true;
        (self.on_host_rejection)(HOST_REJECTED_REASON);
    }

    fn on_client_connected(&mut self, envelope: &Envelope) {
        let client_id = envelope.sender_id();

        if self.state.is_running() {
            log_info(&format!("{} tried to join a running game", envelope.metadata.identity()));
            self.send(Message::GameAlreadyStarted { server_state: self.state.clone() }, Some(client_id));
            return;
        }

        let player = envelope.metadata.identity();
        if self.state.add_player(player.clone()) {
            log_info(&format!("Player joined: {player}"));
            self.send(Message::ConnectionAcknowledged { server_state: self.state.clone() }, Some(client_id));
        }

        self.send_game_info();
    }

    fn on_bingo(&mut self, envelope: &Envelope, reported: &[Number]) {
        let client_id = envelope.sender_id();

        if !self.state.is_running() {
            log_debug(&format!("Ignoring bingo from {client_id}: no game running"));
            return;
        }
        let (Some(caller), Some(card)) = (self.caller.as_ref(), self.player_cards.get(client_id)) else {
            log_warning(&format!("Ignoring bingo from {client_id}: no card issued"));
            return;
        };

        // Only numbers that were really called count towards a prize
        let valid_marks: Vec<Number> = caller
            .called_numbers()
            .iter()
            .copied()
            .filter(|number| reported.contains(number))
            .collect();

        let Some(prize) = card.check_for_awards(&valid_marks) else {
            log_debug(&format!("Bingo from {client_id} earns nothing"));
            return;
        };

        let player = self
            .state
            .find_player(client_id)
            .cloned()
            .unwrap_or_else(|| envelope.metadata.identity());

        if !self.state.prizes.award(prize, player.clone()) {
            log_debug(&format!("{prize} already awarded, ignoring claim from {player}"));
            return;
        }

        log_info(&format!("{prize} awarded to {player}"));
        self.send(
            Message::PrizeAwarded {
                server_state: self.state.clone(),
                prize,
                player: player.clone(),
            },
            None,
        );

        if prize == Prize::FullHouse {
            self.end_game(Some(player), FULL_HOUSE_REASON);
        }
    }

    pub fn end_game(&mut self, winner: Option<Identity>, reason: &str) {
        self.stop();
        self.state.status = GameStatus::Complete;
        self.player_cards.clear();

        match &winner {
            Some(player) => log_info(&format!("Game over: {reason}, winner {player}")),
            None => log_info(&format!("Game over: {reason}")),
        }

        self.send(
            Message::GameComplete {
                server_state: self.state.clone(),
                reason: reason.to_string(),
                winner,
            },
            None,
        );
    }

    fn send_game_info(&self) {
        self.send(Message::GameInfo { server_state: self.state.clone() }, None);
    }

    fn issue_card_to_player(&mut self, player: &Identity) {
        let card = self.generator.generate();
        log_debug(&format!("Issuing card {} to {player}", card.id));
        self.player_cards.insert(player.client_id.clone(), card.clone());
        self.send(
            Message::BingoCardIssued {
                server_state: self.state.clone(),
                card,
            },
            Some(&player.client_id),
        );
    }

    fn remove_player(&mut self, client_id: &str) {
        self.state.remove_player(client_id);
        self.player_cards.remove(client_id);
    }

    fn send(&self, message: Message, for_client_id: Option<&str>) {
        let kind = message.kind();
        if let Err(e) = self.channel.send(message, for_client_id) {
            log_error(&format!("Failed to send {kind}: {e}"));
        }
    }

    #[cfg(test)]
    pub(crate) fn set_card(&mut self, client_id: &str, card: Card) {
        self.player_cards.insert(client_id.to_string(), card);
    }

    #[cfg(test)]
    pub(crate) fn set_caller(&mut self, caller: Caller) {
        self.caller = Some(caller);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Block, Row};
    use crate::channel::RecordingChannel;
    use crate::defs::COLUMNS;
    use crate::message::Metadata;
    use std::sync::Mutex;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::sleep;

    const GAME_ID: &str = "my-cool-game";

    struct Harness {
        server: GameServer<RecordingChannel>,
        channel: Arc<RecordingChannel>,
        events: UnboundedReceiver<SessionEvent>,
    }

    fn harness() -> Harness {
        let host = Identity::with_id("host", "Friendly name");
        let channel = Arc::new(RecordingChannel::new(&host, GAME_ID));
        let (tx, events) = mpsc::unbounded_channel();
        let server = GameServer::new(host, GAME_ID, Arc::clone(&channel), tx);
        Harness { server, channel, events }
    }

    impl Harness {
        /// Feed pending ticks to the server the way the session loop does
        fn pump(&mut self) {
            while let Ok(event) = self.events.try_recv() {
                if let SessionEvent::Tick { generation } = event {
                    self.server.handle_tick(generation);
                }
            }
        }
    }

    fn from(client_id: &str, message: Message) -> Envelope {
        let metadata = Metadata::new(&Identity::with_id(client_id, client_id), GAME_ID);
        Envelope::new(metadata, message, None)
    }

    fn join(h: &mut Harness, client_id: &str) {
        h.server.on_receive_message(&from(client_id, Message::Connected));
    }

    fn row(numbers: &[(usize, Number)]) -> Row {
        let mut row: Row = [None; COLUMNS];
        for &(column, number) in numbers {
            row[column] = Some(number);
        }
        row
    }

    fn card_with_rows(rows: [Row; 3]) -> Card {
        let empty: Row = [None; COLUMNS];
        Card::from_blocks(vec![Block::new(rows), Block::new([empty, empty, empty])])
    }

    fn one_line_card() -> Card {
        let empty: Row = [None; COLUMNS];
        card_with_rows([row(&[(0, 1), (2, 20), (3, 30), (4, 40), (5, 50)]), empty, empty])
    }

    /// Call exactly `numbers`, one tick each
    fn call_numbers(h: &mut Harness, numbers: &[Number]) {
        h.server.set_caller(Caller::from_sequence(numbers));
        for _ in numbers {
            h.server.on_game_tick();
        }
    }

    #[test]
    fn test_connect_offers_to_host() {
        let mut h = harness();
        h.server.connect().unwrap();

        assert!(h.channel.is_connected());
        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, Message::HostOffer { server_state: h.server.state().clone() });
        assert_eq!(h.server.state().status, GameStatus::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sets_running_and_resets_prizes() {
        let mut h = harness();
        h.server.start(Duration::from_millis(100));

        assert_eq!(h.server.state().status, GameStatus::Running);
        assert_eq!(h.server.state().prizes, Prizes::new());
        assert_eq!(h.channel.kinds(), ["new-game", "game-info"]);
        assert_eq!(
            h.channel.sent()[0].message,
            Message::NewGame { server_state: h.server.state().clone() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_issues_one_card_per_player_before_first_tick() {
        let mut h = harness();
        join(&mut h, "12345");
        h.channel.clear();

        h.server.start(Duration::from_millis(100));

        let sent = h.channel.sent();
        assert_eq!(h.channel.kinds(), ["new-game", "bingo-card-issued", "game-info"]);
        assert_eq!(sent[1].for_client_id.as_deref(), Some("12345"));
        assert_eq!(sent[2].for_client_id, None);
        match &sent[1].message {
            Message::BingoCardIssued { card, .. } => {
                assert!(card.is_valid());
                assert_eq!(h.server.card_for("12345"), Some(card));
            }
            other => panic!("expected a card, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_ticks_call_numbers_on_schedule() {
        let mut h = harness();
        h.server.start(Duration::from_millis(100));
        h.channel.clear();

        sleep(Duration::from_millis(120)).await;
        h.pump();

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].message {
            Message::BingoCallerMessage { number, text, .. } => {
                assert!(*number > 0);
                assert!(!text.is_empty());
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_out_of_numbers_and_completes() {
        let mut h = harness();
        h.server.start(Duration::from_millis(1));
        h.channel.clear();

        for _ in 0..100 {
            sleep(Duration::from_millis(1)).await;
            h.pump();
        }

        let kinds = h.channel.kinds();
        assert_eq!(kinds.iter().filter(|k| **k == "bingo-caller-message").count(), 90);
        assert_eq!(kinds.last(), Some(&"game-complete"));
        assert_eq!(kinds.iter().filter(|k| **k == "game-complete").count(), 1);
        match h.channel.last().unwrap().message {
            Message::GameComplete { reason, winner, server_state } => {
                assert_eq!(reason, OUT_OF_NUMBERS_REASON);
                assert_eq!(winner, None);
                assert_eq!(server_state.status, GameStatus::Complete);
            }
            other => panic!("expected game-complete, got {other:?}"),
        }
        assert!(!h.server.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_timer() {
        let mut h = harness();
        h.server.start(Duration::from_millis(100));
        sleep(Duration::from_millis(150)).await;
        // One tick from the first timer is queued but not yet handled
        h.server.start(Duration::from_millis(100));
        h.channel.clear();

        sleep(Duration::from_millis(110)).await;
        h.pump();

        assert_eq!(h.channel.kinds(), ["bingo-caller-message"]);
        assert_eq!(h.server.caller().unwrap().called_numbers().len(), 1);
    }

    #[test]
    fn test_stop_without_timer_is_harmless() {
        let mut h = harness();
        h.server.stop();
        h.server.stop();
        assert!(h.channel.sent().is_empty());
    }

    #[test]
    fn test_unknown_message_is_ignored() {
        let mut h = harness();
        h.server.on_receive_message(&from("someone", Message::Unknown));
        assert!(h.channel.sent().is_empty());
    }

    #[test]
    fn test_own_host_offer_is_ignored() {
        let mut h = harness();
        let offer = Message::HostOffer { server_state: h.server.state().clone() };
        h.server.on_receive_message(&from("host", offer));
        assert!(h.channel.sent().is_empty());
    }

    #[test]
    fn test_competing_host_is_rejected_and_removed() {
        let mut h = harness();
        join(&mut h, "rival");
        assert!(h.server.state().has_player("rival"));
        h.channel.clear();

        let offer = Message::HostOffer { server_state: h.server.state().clone() };
        h.server.on_receive_message(&from("rival", offer));

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.kind(), "host-reject");
        assert_eq!(sent[0].for_client_id.as_deref(), Some("rival"));
        assert!(h.server.state().players.is_empty());
    }

    #[test]
    fn test_host_reject_invokes_callback() {
        let rejected = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&rejected);
        let Harness { server, channel, events } = harness();
        let server = server.on_host_rejection(move |reason| *slot.lock().unwrap() = Some(reason.to_string()));
        let mut h = Harness { server, channel, events };

        let reject = Message::HostReject { server_state: h.server.state().clone() };
        h.server.on_receive_message(&from("other-host", reject));

        assert_eq!(rejected.lock().unwrap().as_deref(), Some(HOST_REJECTED_REASON));
        assert!(h.server.has_abdicated());
    }

    #[test]
    fn test_client_connected_is_acknowledged() {
        let mut h = harness();
        join(&mut h, "12345");

        let sent = h.channel.sent();
        assert_eq!(h.channel.kinds(), ["connection-acknowledged", "game-info"]);
        assert_eq!(sent[0].for_client_id.as_deref(), Some("12345"));
        assert_eq!(sent[1].message, Message::GameInfo { server_state: h.server.state().clone() });
        assert_eq!(h.server.state().players[0].client_id, "12345");
    }

    #[test]
    fn test_player_with_multibyte_id_joins() {
        let mut h = harness();
        join(&mut h, "aéééé");
        assert!(h.server.state().has_player("aéééé"));
        assert_eq!(h.channel.kinds(), ["connection-acknowledged", "game-info"]);
    }

    #[test]
    fn test_reconnecting_client_is_not_added_twice() {
        let mut h = harness();
        join(&mut h, "12345");
        h.channel.clear();
        join(&mut h, "12345");

        assert_eq!(h.channel.kinds(), ["game-info"]);
        assert_eq!(h.server.state().players.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_joining_a_running_game_is_refused() {
        let mut h = harness();
        h.server.start(Duration::from_millis(100));
        h.channel.clear();

        join(&mut h, "12345");

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.kind(), "game-already-started");
        assert_eq!(sent[0].for_client_id.as_deref(), Some("12345"));
        assert!(!h.server.state().has_player("12345"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bingo_from_non_winner_is_ignored() {
        let mut h = harness();
        join(&mut h, "12345");
        h.server.start(Duration::from_millis(100));
        h.server.stop();
        h.channel.clear();

        h.server.on_receive_message(&from("12345", Message::Bingo { numbers: Vec::new() }));
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_line_claim_is_awarded_once() {
        let mut h = harness();
        join(&mut h, "12345");
        h.server.start(Duration::from_millis(100));
        h.server.stop();
        h.server.set_card("12345", one_line_card());

        call_numbers(&mut h, &[1, 20, 30, 40, 50]);
        h.channel.clear();

        let claim = from("12345", Message::Bingo { numbers: vec![1, 20, 30, 40, 50] });
        h.server.on_receive_message(&claim);
        h.server.on_receive_message(&claim);

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].message {
            Message::PrizeAwarded { prize, player, server_state } => {
                assert_eq!(*prize, Prize::OneLine);
                assert_eq!(player.client_id, "12345");
                assert_eq!(server_state.prizes.winner(Prize::OneLine), Some(player));
            }
            other => panic!("expected prize-awarded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_claim_for_awarded_tier_gets_nothing() {
        let mut h = harness();
        join(&mut h, "1");
        join(&mut h, "2");
        h.server.start(Duration::from_millis(100));
        h.server.stop();
        h.server.set_card("1", one_line_card());
        h.server.set_card("2", one_line_card());
        call_numbers(&mut h, &[1, 20, 30, 40, 50]);
        h.channel.clear();

        h.server.on_receive_message(&from("1", Message::Bingo { numbers: vec![1, 20, 30, 40, 50] }));
        h.server.on_receive_message(&from("2", Message::Bingo { numbers: vec![1, 20, 30, 40, 50] }));

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].message {
            Message::PrizeAwarded { player, .. } => assert_eq!(player.client_id, "1"),
            other => panic!("expected prize-awarded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fabricated_numbers_do_not_win() {
        let mut h = harness();
        join(&mut h, "12345");
        h.server.start(Duration::from_millis(100));
        h.server.stop();
        h.server.set_card("12345", one_line_card());
        // 50 is never called
        call_numbers(&mut h, &[1, 20, 30, 40]);
        h.channel.clear();

        let claim = from("12345", Message::Bingo { numbers: vec![1, 20, 30, 40, 50, 50] });
        h.server.on_receive_message(&claim);

        assert!(h.channel.sent().is_empty());
        assert!(!h.server.state().prizes.is_awarded(Prize::OneLine));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_house_awards_and_completes_game() {
        let mut h = harness();
        join(&mut h, "12345");
        h.server.start(Duration::from_millis(100));
        h.server.stop();
        h.server.set_card(
            "12345",
            card_with_rows([
                row(&[(0, 1), (2, 20), (3, 30), (4, 40), (5, 50)]),
                row(&[(0, 2), (2, 21), (3, 31), (4, 41), (5, 51)]),
                row(&[(0, 3), (2, 22), (3, 32), (4, 42), (5, 52)]),
            ]),
        );
        let numbers = [1, 2, 3, 20, 21, 22, 30, 31, 32, 40, 41, 42, 50, 51, 52];
        call_numbers(&mut h, &numbers);
        h.channel.clear();

        h.server.on_receive_message(&from("12345", Message::Bingo { numbers: numbers.to_vec() }));

        let sent = h.channel.sent();
        assert_eq!(h.channel.kinds(), ["prize-awarded", "game-complete"]);
        match (&sent[0].message, &sent[1].message) {
            (Message::PrizeAwarded { prize, .. }, Message::GameComplete { winner, reason, .. }) => {
                assert_eq!(*prize, Prize::FullHouse);
                assert_eq!(winner.as_ref().map(|w| w.client_id.as_str()), Some("12345"));
                assert_eq!(reason, FULL_HOUSE_REASON);
            }
            other => panic!("unexpected messages {other:?}"),
        }
        assert_eq!(h.server.state().status, GameStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_player_loses_card() {
        let mut h = harness();
        join(&mut h, "rival");
        h.server.start(Duration::from_millis(100));
        h.server.stop();
        assert!(h.server.card_for("rival").is_some());

        let offer = Message::HostOffer { server_state: h.server.state().clone() };
        h.server.on_receive_message(&from("rival", offer));

        assert!(h.server.card_for("rival").is_none());
    }
}
