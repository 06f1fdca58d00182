//! Intercom host - drives one side of a shared-memory channel.
//!
//! Run one process per side with the same identifier:
//!
//! ```text
//! intercom demo --side foo --ping-every-ms 500
//! intercom demo --side bar --message "hello from bar"
//! ```

mod handlers;

use anyhow::Result;
use clap::Parser;
use handlers::Stats;
use intercom::{args, Channel, JsonCodec, Side};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Interval;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "intercom")]
#[command(about = "Drive one side of a shared-memory intercom channel")]
struct Args {
    /// Channel identifier shared by both processes
    identifier: String,

    /// Side this process plays (foo or bar)
    #[arg(short, long, value_parser = parse_side)]
    side: Side,

    /// Milliseconds between polls
    #[arg(long, default_value = "16")]
    interval_ms: u64,

    /// Send a Ping every N milliseconds
    #[arg(long)]
    ping_every_ms: Option<u64>,

    /// Send this text once as a Log call and wait for the peer to poll
    #[arg(short, long)]
    message: Option<String>,

    /// Encode arguments as JSON (both sides must agree)
    #[arg(long)]
    json: bool,

    /// Stay idle until the peer has created its outbox
    #[arg(long)]
    wait_for_peer: bool,

    /// Remove the channel's shared memory regions on exit
    #[arg(long)]
    cleanup: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn parse_side(s: &str) -> std::result::Result<Side, String> {
    Side::from_str(s).ok_or_else(|| format!("unknown side '{}', expected foo or bar", s))
}

/// Wait for the next tick, or forever when pinging is disabled.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let platform = intercom::platform::current_platform();
    if !intercom::platform::is_supported_platform() {
        anyhow::bail!("Named shared memory is not supported on {}", platform);
    }
    info!(
        "Starting intercom {} on {} ({})",
        args.side, args.identifier, platform
    );

    let mut builder =
        Channel::builder(args.side, &args.identifier).wait_for_peer(args.wait_for_peer);
    if args.json {
        builder = builder.codec(JsonCodec);
    }
    let mut channel = builder.build()?;

    let stats = Arc::new(Stats::default());
    let invoker = channel.invoker();
    channel.set_dispatcher(handlers::registry(invoker.clone(), stats.clone()));

    if let Some(text) = args.message.clone() {
        let invoker = invoker.clone();
        tokio::spawn(async move {
            match invoker.invoke_and_await("Log", args![text]).await {
                Ok(()) => info!("Peer polled after the message was queued"),
                Err(e) => warn!("Could not send message: {}", e),
            }
        });
    }

    let mut poll_tick = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut ping_tick = args
        .ping_every_ms
        .map(|ms| tokio::time::interval(Duration::from_millis(ms.max(1))));
    let mut seq: i64 = 0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                let outcome = channel.poll_with(|inv| {
                    stats.unhandled.fetch_add(1, Ordering::Relaxed);
                    warn!("Unhandled invocation {} with {} arguments", inv.method(), inv.args().len());
                });
                match outcome {
                    Ok(report) => {
                        if report.sent.is_some() {
                            stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                        }
                        if report.received.is_some() {
                            stats.batches_received.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) if e.is_retryable() => warn!("Poll will retry: {}", e),
                    Err(e) => error!("Poll failed: {}", e),
                }
            }
            _ = next_tick(&mut ping_tick) => {
                seq += 1;
                invoker.invoke("Ping", args![seq])?;
                stats.ping_sent(seq);
            }
            result = &mut shutdown => {
                result?;
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }

    // Summary for the operator (intentional stdout)
    println!("{}", stats.summary());

    if args.cleanup {
        drop(channel);
        Channel::remove_regions(&args.identifier)?;
        info!("Removed regions for {}", args.identifier);
    }

    Ok(())
}
