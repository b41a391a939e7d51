//! Tic-Tac-Toe Terminal Client
//!
//! Usage: `tictactoe-client <name>`. Type a cell number (0-8) to move,
//! `again` to queue for another match and `quit` to leave.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tictactoe::client::{GameClient, Phase};
use tictactoe::{ServerMessage, VERSION};

const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let name = std::env::args().nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: tictactoe-client <name>"))?;
    let url = std::env::var("TICTACTOE_SERVER_URL")
        .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

    info!("Tic-Tac-Toe Client v{}", VERSION);
    let mut client = GameClient::connect(&url, &name).await?;
    println!("{}", client.state().status());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = client.next_event() => {
                let Some(event) = event else {
                    println!("Connection closed");
                    break;
                };
                if let ServerMessage::Error(err) = &event {
                    println!("Rejected: {}", err.message);
                    continue;
                }
                let state = client.state();
                if matches!(state.phase(), Phase::Playing | Phase::Finished(_)) {
                    println!("\n{}\n", state.board());
                }
                if let (Phase::Finished(_), Some(line)) = (state.phase(), state.winning_line()) {
                    println!("Winning line: {:?}", line);
                }
                println!("{}", state.status());
                if state.phase() == Phase::Disconnected {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    client.leave().await?;
                    break;
                };
                match line.trim() {
                    "quit" | "q" => {
                        client.leave().await?;
                        break;
                    }
                    "again" => {
                        if !client.play_again().await? {
                            println!("Can't queue again until this match is over");
                        }
                        println!("{}", client.state().status());
                    }
                    input => match input.parse::<usize>() {
                        Ok(cell) => {
                            if !client.click_cell(cell).await? {
                                println!("Can't play cell {} right now", cell);
                            }
                        }
                        Err(_) => println!("Enter a cell number (0-8), `again` or `quit`"),
                    },
                }
            }
        }
    }

    Ok(())
}
