use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use usdwire::{Outcome, TransferClient, TransferReport};

use crate::Command;

/// Runs one CLI command on a connected client and returns the exit code.
pub async fn run(client: &mut TransferClient, command: Command) -> u8 {
    match command {
        Command::SendFile { path } => send_file(client, &path).await,
        Command::SendMessage { text } => {
            let report = client.send_message(&text.join(" ")).await;
            print_report(&report);
            report.exit_code() as u8
        }
        Command::SendJson { path } => {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    error!("Error reading JSON file {}: {}", path.display(), e);
                    return 1;
                }
            };
            let report = client.send_json_str(&text).await;
            print_report(&report);
            report.exit_code() as u8
        }
        Command::Test => {
            run_test_sequence(client).await;
            0
        }
        Command::Interactive => {
            interactive(client).await;
            0
        }
    }
}

async fn send_file(client: &mut TransferClient, path: &Path) -> u8 {
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        println!("Filename: {}", path.display());
        println!("Size: {}", format_bytes(metadata.len()));
    }
    let report = client.send_file(path).await;
    if let Some(digest) = &report.digest {
        println!("Hash: {}...", &digest[..16]);
    }
    print_report(&report);
    report.exit_code() as u8
}

fn print_report(report: &TransferReport) {
    match &report.outcome {
        Outcome::Succeeded { reply } => println!("Server reply: {reply}"),
        Outcome::TimedOut => println!("No reply received (timeout)"),
        Outcome::Failed(e) => eprintln!("Error: {e}"),
    }
}

async fn run_test_sequence(client: &mut TransferClient) {
    info!("Running test sequence...");

    info!("--- Test 1: Simple message ---");
    print_report(&client.send_message("Hello from usdwire client!").await);
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("--- Test 2: JSON message ---");
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let test_data = serde_json::json!({
        "type": "test",
        "timestamp": timestamp,
        "client": "usdwire_client",
        "data": {
            "message": "This is a test JSON message",
            "version": "1.0"
        }
    });
    print_report(&client.send_json(&test_data).await);
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("--- Test 3: Status request ---");
    print_report(&client.send_message("STATUS").await);

    info!("Test sequence completed");
}

/// A line typed in interactive mode.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    File(&'a str),
    Message(&'a str),
    Json(&'a str),
    Quit,
    Empty,
    Unknown,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line.eq_ignore_ascii_case("quit") {
        return Input::Quit;
    }
    let Some((command, arg)) = line.split_once(' ') else {
        return Input::Unknown;
    };
    let arg = arg.trim();
    if arg.is_empty() {
        return Input::Unknown;
    }
    match command.to_ascii_lowercase().as_str() {
        "file" => Input::File(arg),
        "message" => Input::Message(arg),
        "json" => Input::Json(arg),
        _ => Input::Unknown,
    }
}

async fn interactive(client: &mut TransferClient) {
    println!("Interactive mode - type 'quit' to exit");
    println!("Commands: file <path>, message <text>, json <data>, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&mut std::io::stdout());

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        match parse_input(&line) {
            Input::File(path) => {
                send_file(client, Path::new(path)).await;
            }
            Input::Message(text) => print_report(&client.send_message(text).await),
            Input::Json(text) => print_report(&client.send_json_str(text).await),
            Input::Quit => break,
            Input::Empty => {}
            Input::Unknown => {
                println!("Unknown command. Use: file <path>, message <text>, json <data>, quit")
            }
        }
    }
    println!("Exiting interactive mode");
}

fn prompt(out: &mut impl Write) {
    if let Err(e) = write!(out, "\n> ").and_then(|()| out.flush()) {
        debug!("Failed to show prompt: {}", e);
    }
}

/// Human-readable size with two decimals.
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}
