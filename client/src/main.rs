mod session;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::error;
use usdwire::{
    Endpoint, SessionConfig, TransferClient, DEFAULT_ENDPOINT, DEFAULT_LINGER_MS,
    DEFAULT_RECV_TIMEOUT_MS, DEFAULT_SEND_TIMEOUT_MS,
};

/// Sends USD files, images and messages to a ZeroMQ ROUTER peer.
#[derive(Parser, Debug)]
#[command(name = "usdwire-client", version)]
struct Cli {
    /// Peer endpoint (tcp://host:port, ipc:///path or vsock://cid:port)
    #[arg(long, env = "USDWIRE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// How long to wait for a reply
    #[arg(long, default_value_t = DEFAULT_RECV_TIMEOUT_MS)]
    recv_timeout_ms: u64,

    /// How long a send may block
    #[arg(long, default_value_t = DEFAULT_SEND_TIMEOUT_MS)]
    send_timeout_ms: u64,

    /// How long unsent data may delay shutdown
    #[arg(long, default_value_t = DEFAULT_LINGER_MS)]
    linger_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a USD file or image
    SendFile { path: PathBuf },
    /// Send a text message
    SendMessage {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Send JSON read from a file
    SendJson { path: PathBuf },
    /// Send a canned sequence of test messages
    Test,
    /// Read commands from stdin
    Interactive,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let endpoint: Endpoint = match cli.endpoint.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let config = SessionConfig::default()
        .with_recv_timeout(Duration::from_millis(cli.recv_timeout_ms))
        .with_send_timeout(Duration::from_millis(cli.send_timeout_ms))
        .with_linger(Duration::from_millis(cli.linger_ms));

    let mut client = match TransferClient::connect(endpoint, config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Connection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = session::run(&mut client, cli.command).await;
    client.disconnect().await;
    ExitCode::from(code)
}
