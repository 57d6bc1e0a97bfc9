use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ruccola::config::Config;
use ruccola::realtime::{InboundFrame, RealtimeClient, ServerMessage};
use ruccola::rest::{Channel, HistoryQuery, RestClient};
use ruccola::telemetry;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{info, warn};

const ROOM_MESSAGES_STREAM: &str = "stream-room-messages";

#[derive(Debug, Parser)]
#[command(name = "ruccola", version, about = "Rocket.Chat command-line client")]
struct Cli {
    /// Config file (defaults to ~/.config/ruccola/config.ini).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List channels you have joined (default).
    Channels,
    /// List every channel visible to you.
    AllChannels,
    /// Post a message to a joined channel.
    Post { channel: String, text: String },
    /// Print recent messages of a joined channel.
    History {
        channel: String,
        #[arg(long, default_value_t = 20)]
        count: u32,
    },
    /// Stream new messages of a joined channel until Ctrl+C.
    Watch { channel: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _log_guard = telemetry::init(cli.log_file.as_deref(), cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_env_or_file(path)?,
        None => Config::from_env_or_file(&Config::default_path()?)?,
    };
    let rest = RestClient::new(&config)?;

    match cli.command.unwrap_or(Command::Channels) {
        Command::Channels => print_channels(&rest.list_joined_channels().await?),
        Command::AllChannels => print_channels(&rest.list_channels().await?),
        Command::Post { channel, text } => {
            let channel = joined_channel(&rest, &channel).await?;
            let reply = rest.post_message(&channel, text).await?;
            let id = reply.message.map(|message| message.id).unwrap_or_default();
            println!("posted to {} id={id}", channel.display_name());
        }
        Command::History { channel, count } => {
            let channel = joined_channel(&rest, &channel).await?;
            let query = HistoryQuery::new(channel.id.clone()).with_count(count);
            let mut messages = rest.channel_history(&query).await?;
            // Newest first on the wire.
            messages.reverse();
            for message in messages {
                println!("<{}> {}", message.author_name().unwrap_or("?"), message.msg);
            }
        }
        Command::Watch { channel } => {
            let channel = joined_channel(&rest, &channel).await?;
            watch(&config, &channel).await?;
        }
    }

    Ok(())
}

async fn joined_channel(rest: &RestClient, name: &str) -> Result<Channel, Box<dyn Error>> {
    rest.find_joined_channel(name)
        .await?
        .ok_or_else(|| format!("not a member of #{}", name.trim_start_matches('#')).into())
}

fn print_channels(channels: &[Channel]) {
    for channel in channels {
        println!("{}", channel.display_name());
    }
}

async fn watch(config: &Config, channel: &Channel) -> Result<(), Box<dyn Error>> {
    let client = RealtimeClient::from_config(config);
    let mut connection = client.connect().await?;
    info!(event = "watch_started", channel = %channel.display_name());

    connection.call("login", vec![json!({ "resume": config.token.expose_secret() })])?;
    connection.subscribe(ROOM_MESSAGES_STREAM, vec![json!(channel.id), json!(false)])?;

    let sender = connection.sender();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = connection.recv() => {
                let Some(frame) = frame else { break };
                match frame.parse() {
                    Ok(ServerMessage::Ping { id, .. }) => sender.pong(id)?,
                    Ok(ServerMessage::Nosub { id, error, .. }) => {
                        warn!(event = "subscription_rejected", id = %id, error = ?error);
                        break;
                    }
                    _ => match &frame {
                        InboundFrame::Text(text) => println!("{text}"),
                        InboundFrame::Binary(bytes) => println!("<{} binary bytes>", bytes.len()),
                    },
                }
            }
        }
    }

    let outcome = connection.shutdown().await;
    info!(event = "watch_stopped", outcome = ?outcome);
    Ok(())
}
