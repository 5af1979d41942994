// src/bingo_session.rs
// Runs a complete local game: one host, a few bot players and optionally a
// rival host, all talking over one in-process hub.
//
// Usage:
//   bingo-session [--name NAME] [--gameid ID] [--players N] [--call-interval-ms MS]
//                 [--automark] [--rival-host] [--config FILE] [--verbose]

use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use bingo::channel::LocalHub;
use bingo::client::ConnectionStatus;
use bingo::config::{SessionConfig, DEFAULT_CONFIG_PATH};
use bingo::defs::Number;
use bingo::identity::Identity;
use bingo::logging::{log_error, log_info, log_warning, set_log_level, LogLevel};
use bingo::prize::{Prize, Prizes};
use bingo::session::{ClientView, Participant, ParticipantOptions, SessionHandle, SessionNotice};
use bingo::terminal::{self, TerminalAnnouncer};

#[derive(Parser)]
#[command(name = env!("CARGO_BIN_NAME"))]
#[command(about = "Bingo Session - Host a local game against bot players")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file (default conf/session.conf)
    #[arg(long)]
    config: Option<String>,

    /// Host display name (default from config)
    #[arg(short, long)]
    name: Option<String>,

    /// Game ID to host (generated when absent)
    #[arg(long)]
    gameid: Option<String>,

    /// Number of bot players
    #[arg(long)]
    players: Option<usize>,

    /// Milliseconds between calls
    #[arg(long)]
    call_interval_ms: Option<u64>,

    /// Mark called numbers automatically on every card
    #[arg(long)]
    automark: bool,

    /// Start a second host that must be rejected
    #[arg(long)]
    rival_host: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_to(&self, config: &mut SessionConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(game_id) = &self.gameid {
            config.game_id = Some(game_id.clone());
        }
        if let Some(players) = self.players {
            config.players = players;
        }
        if let Some(interval) = self.call_interval_ms {
            config.call_interval_ms = interval;
        }
        if self.automark {
            config.automark = true;
        }
    }
}

fn spawn_participant(
    hub: &LocalHub,
    identity: Identity,
    game_id: &str,
    options: ParticipantOptions,
    tasks: &mut Vec<JoinHandle<()>>,
) -> Result<SessionHandle, Box<dyn std::error::Error>> {
    let (participant, handle) = Participant::join_local(hub, identity, game_id, options)?;
    tasks.push(tokio::spawn(participant.run()));
    Ok(handle)
}

/// Play a card the way a careful human would: click every called number on
/// the card and claim as soon as a prize nobody has won yet is reached.
async fn drive_bot(handle: SessionHandle) {
    let mut view = handle.subscribe();
    let mut clicked: Vec<Number> = Vec::new();
    let mut claimed: Option<Prize> = None;
    let mut last_seen: Option<Number> = None;

    while view.changed().await.is_ok() {
        let current: ClientView = view.borrow_and_update().clone();
        if current.client.is_game_over() {
            break;
        }
        let (Some(card), Some(server_state)) = (&current.client.card, &current.server_state) else {
            continue;
        };

        if let Some(number) = current.client.last_called_number {
            if last_seen != Some(number) {
                last_seen = Some(number);
                if card.contains(number) && !server_state.settings.automark && !clicked.contains(&number) {
                    clicked.push(number);
                    handle.click_number(number);
                }
            }
        }

        let marks: &[Number] = if server_state.settings.automark {
            &current.client.noticed_numbers
        } else {
            &clicked
        };
        if let Some(prize) = card.check_for_awards(marks) {
            // A claim during the cooldown would be dropped, so wait for the next update
            if claimed < Some(prize) && !server_state.prizes.is_awarded(prize) && current.can_claim {
                claimed = Some(prize);
                handle.claim_bingo();
            }
        }
    }
}

fn print_new_prizes(before: &Prizes, after: &Prizes) {
    for prize in Prize::ALL {
        if before.winner(prize).is_none() {
            if let Some(player) = after.winner(prize) {
                terminal::print_prize(prize, player);
            }
        }
    }
}

/// Follow the host's view until the game is over. Calls are printed by the
/// host's announcer.
async fn watch_game(host: &SessionHandle) -> Option<ClientView> {
    let mut view = host.subscribe();
    let mut prizes = Prizes::new();
    let mut shown_card = false;

    while view.changed().await.is_ok() {
        let current: ClientView = view.borrow_and_update().clone();

        if let (false, Some(card)) = (shown_card, &current.client.card) {
            terminal::print_card(host.identity(), card, &[], None);
            shown_card = true;
        }

        if let Some(server_state) = &current.server_state {
            print_new_prizes(&prizes, &server_state.prizes);
            prizes = server_state.prizes.clone();
        }

        if current.client.is_game_over() {
            return Some(current);
        }
        if !current.hosting {
            log_error("Host lost its role, stopping");
            return None;
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    if args.verbose {
        set_log_level(LogLevel::Debug);
    }

    let mut config = SessionConfig::load_or_default(args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));
    args.apply_to(&mut config);
    let game_id = config.game_id_or_generate();
    log_info(&format!("Hosting game {game_id} with {} bot players", config.players));

    let hub = LocalHub::new();
    let mut tasks = Vec::new();
    let mut handles = Vec::new();

    let mut host_options = ParticipantOptions::from_config(&config, true);
    host_options.announcer = Box::new(TerminalAnnouncer::new(&config.name));
    let host = spawn_participant(&hub, Identity::new(&config.name), &game_id, host_options, &mut tasks)?;
    handles.push(host.clone());

    if args.rival_host {
        let options = ParticipantOptions::from_config(&config, true);
        let mut rival = spawn_participant(&hub, Identity::new("Rival"), &game_id, options, &mut tasks)?;
        match timeout(config.discovery_timeout(), rival.wait_for(|v| !v.hosting)).await {
            Ok(Some(view)) => {
                for notice in &view.notices {
                    if let SessionNotice::HostRejected(reason) = notice {
                        log_info(&format!("Rival host stepped down: {reason}"));
                    }
                }
            }
            _ => log_warning("Rival host was not rejected"),
        }
        handles.push(rival);
    }

    let mut bots = Vec::new();
    for i in 1..=config.players {
        let options = ParticipantOptions::from_config(&config, false);
        let mut bot = spawn_participant(&hub, Identity::new(&format!("Bot {i}")), &game_id, options, &mut tasks)?;
        let joined = timeout(
            config.discovery_timeout(),
            bot.wait_for(|v| v.client.status == ConnectionStatus::Acknowledged),
        )
        .await;
        if !matches!(joined, Ok(Some(_))) {
            log_warning(&format!("{} was not acknowledged by the host", bot.identity()));
        }
        handles.push(bot.clone());
        bots.push(tokio::spawn(drive_bot(bot)));
    }

    host.start_game(config.call_interval());
    match watch_game(&host).await {
        Some(result) => {
            terminal::print_result(&result.client.game_end_reason, result.client.winner.as_ref());
        }
        None => log_error("The game ended without a result"),
    }

    for handle in &handles {
        handle.shutdown();
    }
    for bot in bots {
        bot.abort();
    }
    for task in tasks {
        let _ = timeout(Duration::from_secs(1), task).await;
    }
    Ok(())
}
