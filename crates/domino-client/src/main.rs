//! Headless domino client: joins a room over WebSocket, logs the table and
//! optionally plays on its own.
//!
//! Run with: `cargo run -p domino-client -- --server ws://host/ws --player p1`

use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use domino_client::{ConnectivityNotice, GameEvent, GameSession};
use domino_config::{CliArgs, Config};
use domino_engine::PlayerId;
use domino_net::{ConnectionStatus, WsTransport};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Ticks allowed for the close handshake on shutdown.
const SHUTDOWN_TICKS: u32 = 40;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map(Ok).unwrap_or_else(Config::default_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("No config directory ({e}); using the working directory");
            PathBuf::from(".")
        }
    };
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}; using defaults");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    domino_log::init_logging(
        Some(&config_dir.join("logs")),
        config.debug.file_logging,
        Some(&config),
    );
    if let Err(e) = config.validate() {
        error!(error = %e, "refusing to start with this configuration");
        return ExitCode::FAILURE;
    }

    let player = PlayerId::from(args.player.clone().unwrap_or_else(|| "player".to_string()));
    info!(%player, server = %config.network.server_url, autoplay = config.game.autoplay, "domino client starting");

    let transport = match WsTransport::new() {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %e, "failed to create transport");
            return ExitCode::FAILURE;
        }
    };
    let mut session = match GameSession::new(transport, player, &config) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to create session");
            return ExitCode::FAILURE;
        }
    };

    let fatal = Rc::new(Cell::new(false));
    let fatal_flag = Rc::clone(&fatal);
    session.subscribe(move |event| {
        if matches!(event, GameEvent::Connectivity(ConnectivityNotice::Fatal { .. })) {
            fatal_flag.set(true);
        }
        log_event(event);
    });

    if let Err(e) = session.connect(&config.network.endpoint()) {
        error!(error = %e, "failed to connect");
        return ExitCode::FAILURE;
    }

    let mut interval = tokio::time::interval(config.network.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                session.tick(Instant::now());
                if fatal.get() {
                    error!("connection lost for good, exiting");
                    return ExitCode::FAILURE;
                }
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    session.disconnect();
    for _ in 0..SHUTDOWN_TICKS {
        if session.status() == ConnectionStatus::Disconnected {
            break;
        }
        interval.tick().await;
        session.tick(Instant::now());
    }
    ExitCode::SUCCESS
}

fn log_event(event: &GameEvent) {
    match event {
        GameEvent::PlayerJoined { player, name } => info!(%player, ?name, "player joined"),
        GameEvent::PlayerLeft { player } => info!(%player, "player left"),
        GameEvent::ReadyChanged { player, ready } => info!(%player, ready, "ready changed"),
        GameEvent::GameStarted { round, first_player } => {
            info!(round, first = %first_player, "round started");
        }
        GameEvent::TurnChanged { player, is_mine } => info!(%player, is_mine, "turn"),
        GameEvent::TilePlayed { player, tile, end } => info!(%player, %tile, %end, "tile played"),
        GameEvent::TileDrawn { player, tile } => match tile {
            Some(tile) => info!(%player, %tile, "drew"),
            None => info!(%player, "drew"),
        },
        GameEvent::TurnSkipped { player, reason } => info!(%player, %reason, "skipped"),
        GameEvent::GameBlocked { reason } => info!(%reason, "game blocked"),
        GameEvent::RoundEnded { winner, round, next_round } => {
            info!(round, ?winner, ?next_round, "round ended");
        }
        GameEvent::GameEnded { winner, scores } => info!(?winner, ?scores, "game ended"),
        GameEvent::Chat { player, message } => info!(%player, %message, "chat"),
        GameEvent::ServerError { code, message } => warn!(%code, %message, "server error"),
        GameEvent::StateRestored => info!("state restored"),
        GameEvent::SyncFailed(e) => warn!(error = %e, "out of sync"),
        GameEvent::Connectivity(notice) => match notice {
            ConnectivityNotice::Connected { resumed } => info!(resumed, "connected"),
            ConnectivityNotice::Lost { code } => warn!(%code, "connection lost"),
            ConnectivityNotice::Reconnecting { attempt, delay } => {
                info!(attempt, ?delay, "reconnecting");
            }
            ConnectivityNotice::SendFailed { reason } => warn!(%reason, "send failed"),
            ConnectivityNotice::Fatal { attempts } => error!(attempts, "giving up"),
            ConnectivityNotice::Disconnected => info!("disconnected"),
        },
    }
}
