use std::error::Error;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::mpsc;

use room_chat::chat::ReconnectPolicy;
use room_chat::common::{RoomId, SessionCommand, SessionEvent, UserId};
use room_chat::config::{self, AppConfig};
use room_chat::console;
use room_chat::network::{ChatClient, HttpRoomService, WsGateway};
use room_chat::ui::ChatApp;
use room_chat::ui::state::AppState;

#[derive(Parser)]
#[command(name = "room_chat", version, about = "Realtime room chat client")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// User id to prefill (required for console mode)
    #[arg(long)]
    user: Option<String>,
    /// Room id to prefill (required for console mode)
    #[arg(long)]
    room: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Join one room in the terminal instead of opening a window
    Console,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    config::apply_overrides(&mut app_config, |key| std::env::var(key).ok());
    log::info!(
        "Gateway {} / API {}",
        app_config.gateway_url,
        app_config.api_base_url
    );

    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    let (event_tx, event_rx) = mpsc::channel(100);

    let client = build_client(&app_config, event_tx, cmd_rx)?;
    let session = tokio::spawn(client.run());

    if cli.mode == Some(Mode::Console) {
        let (Some(user), Some(room)) = (cli.user, cli.room) else {
            return Err("console mode needs --user and --room".into());
        };
        console::run(cmd_tx, event_rx, UserId::new(user)?, RoomId::new(room)?).await?;
        if let Err(err) = session.await {
            log::error!("Session loop terminated: {err}");
        }
        return Ok(());
    }

    run_desktop(cmd_tx, event_rx, AppState::with_prefill(cli.user, cli.room))?;
    Ok(())
}

fn build_client(
    app_config: &AppConfig,
    event_tx: mpsc::Sender<SessionEvent>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
) -> Result<ChatClient<WsGateway, HttpRoomService, HttpRoomService>, Box<dyn Error>> {
    let gateway = WsGateway::new(app_config.gateway_url.clone(), app_config.connect_timeout());
    let rooms = HttpRoomService::new(
        &app_config.api_base_url,
        app_config.history_page_size,
        app_config.request_timeout(),
    )?;
    let policy = ReconnectPolicy::from(&app_config.reconnect);

    Ok(ChatClient::new(
        event_tx,
        cmd_rx,
        gateway,
        rooms.clone(),
        rooms,
        policy,
    ))
}

fn run_desktop(
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_rx: mpsc::Receiver<SessionEvent>,
    state: AppState,
) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);
    let mut state = Some(state);

    eframe::run_native(
        "Room Chat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");
            let state = state.take().unwrap_or_default();

            Ok(Box::new(ChatApp::new(cc, state, cmd_tx.clone(), event_receiver)))
        }),
    )
}
