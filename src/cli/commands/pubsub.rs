//! Subscribe and Notify command implementations (kcat-style peer client).

use crate::cli::args::{NotifyArgs, OutputFormat, RoleArg, SubscribeArgs};
use crate::protocol::{ClientMessage, Role, ServerMessage};
use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::signal::unix::{signal, SignalKind};

/// Run the subscribe command - connect to the broker and stream events to stdout.
pub async fn run_subscribe(args: SubscribeArgs) -> Result<()> {
    run_subscribe_async(args).await
}

/// Run the notify command - drive the admin notify ingress.
pub async fn run_notify(args: NotifyArgs) -> Result<()> {
    run_notify_async(args).await
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> &'static str {
    let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

impl RoleArg {
    fn to_role(self) -> Role {
        match self {
            RoleArg::Admin => Role::Admin,
            RoleArg::Courier => Role::Courier,
            RoleArg::Client => Role::Client,
        }
    }
}

// -----------------------------------------------------------------------------
// Subscribe implementation
// -----------------------------------------------------------------------------

async fn run_subscribe_async(args: SubscribeArgs) -> Result<()> {
    let addr = format!("{}:{}", args.connect.host, args.connect.port);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connect to broker at {addr}"))?;
    eprintln!("connected to {addr}");
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    send(
        &mut write_half,
        &ClientMessage::Authenticate {
            identity: args.connect.identity.clone(),
            role: args.connect.role.to_role(),
            credential_token: args.connect.token.clone(),
        },
    )
    .await?;
    for topic in &args.topic {
        send(
            &mut write_half,
            &ClientMessage::SubscribeTopic {
                topic: topic.clone(),
            },
        )
        .await?;
    }
    eprintln!(
        "subscribed to {} topic(s): {}",
        args.topic.len(),
        args.topic.join(", ")
    );

    loop {
        tokio::select! {
            biased;
            sig = shutdown_signal() => {
                eprintln!("received {sig}, shutting down...");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_event(&mut write_half, &args.format, &line).await? {
                            break;
                        }
                    }
                    Ok(None) => {
                        eprintln!("broker closed the connection");
                        break;
                    }
                    Err(err) => {
                        bail!("connection error: {err}");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Process one broker line. Returns false when the stream should end.
async fn handle_event(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    format: &OutputFormat,
    line: &str,
) -> Result<bool> {
    let message: ServerMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(err) => {
            eprintln!("skipping unparseable line: {err}");
            return Ok(true);
        }
    };
    match &message {
        ServerMessage::Probe => {
            // Keep the session alive across liveness sweeps.
            send(write_half, &ClientMessage::Pong).await?;
            return Ok(true);
        }
        ServerMessage::Error { code, message } => {
            eprintln!("broker error ({code:?}): {message}");
            return Ok(true);
        }
        ServerMessage::Disconnect { reason } => {
            eprintln!("disconnected by broker: {reason:?}");
            return Ok(false);
        }
        ServerMessage::Welcome { .. } => return Ok(true),
        ServerMessage::Authenticated { identity, load, .. } => {
            eprintln!(
                "authenticated as {identity} ({} sessions, {} topics)",
                load.sessions, load.topics
            );
            return Ok(true);
        }
        ServerMessage::Subscribed { .. }
        | ServerMessage::Unsubscribed { .. }
        | ServerMessage::Stats { .. }
        | ServerMessage::Pong { .. } => return Ok(true),
        ServerMessage::PackageUpdate { .. }
        | ServerMessage::LocationUpdate { .. }
        | ServerMessage::Echo { .. } => {}
    }
    match format {
        OutputFormat::Json => println!("{line}"),
        OutputFormat::Raw => match &message {
            ServerMessage::PackageUpdate { payload, .. } => {
                println!("{}", serde_json::to_string(payload)?);
            }
            ServerMessage::LocationUpdate { payload, .. } => {
                println!("{}", serde_json::to_string(payload)?);
            }
            ServerMessage::Echo { payload } => println!("{payload}"),
            _ => {}
        },
    }
    Ok(true)
}

async fn send(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    message: &ClientMessage,
) -> Result<()> {
    let mut line = serde_json::to_vec(message).context("encode message")?;
    line.push(b'\n');
    write_half.write_all(&line).await.context("send message")?;
    Ok(())
}

// -----------------------------------------------------------------------------
// Notify implementation
// -----------------------------------------------------------------------------

async fn run_notify_async(args: NotifyArgs) -> Result<()> {
    let addr = format!("{}:{}", args.host, args.port);
    let mut query = format!(
        "topic={}&status={}",
        percent_encode(&args.topic),
        percent_encode(&args.status)
    );
    if let Some(details) = &args.details {
        query.push_str("&details=");
        query.push_str(&percent_encode(details));
    }
    let request = format!(
        "GET /v1/notify?{query} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    );

    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connect to admin endpoint at {addr}"))?;
    stream
        .write_all(request.as_bytes())
        .await
        .context("send notify request")?;
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .context("read notify response")?;

    let status_line = response.lines().next().unwrap_or("");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("");
    if !status_line.contains(" 200 ") {
        bail!("notify rejected: {status_line} {body}");
    }
    println!("{body}");
    Ok(())
}

/// Encode a query-string value (space and reserved characters).
fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
