//! Handlers registered by the command-line host.

use intercom::{args, HandlerRegistry, Invoker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counters printed when the host exits.
#[derive(Debug, Default)]
pub struct Stats {
    pub pings_sent: AtomicU64,
    pub pings_received: AtomicU64,
    pub pongs_received: AtomicU64,
    pub logs_received: AtomicU64,
    pub unhandled: AtomicU64,
    pub batches_sent: AtomicU64,
    pub batches_received: AtomicU64,
    outstanding: Mutex<HashMap<i64, Instant>>,
}

impl Stats {
    /// Remember when ping `seq` was queued.
    pub fn ping_sent(&self, seq: i64) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut outstanding) = self.outstanding.lock() {
            outstanding.insert(seq, Instant::now());
        }
    }

    /// Round trip of ping `seq`, if this process sent it.
    fn pong_received(&self, seq: i64) -> Option<Duration> {
        self.pongs_received.fetch_add(1, Ordering::Relaxed);
        let sent = self.outstanding.lock().ok()?.remove(&seq)?;
        Some(sent.elapsed())
    }

    pub fn summary(&self) -> String {
        format!(
            "batches sent={} received={} | pings sent={} received={} | pongs={} logs={} unhandled={}",
            self.batches_sent.load(Ordering::Relaxed),
            self.batches_received.load(Ordering::Relaxed),
            self.pings_sent.load(Ordering::Relaxed),
            self.pings_received.load(Ordering::Relaxed),
            self.pongs_received.load(Ordering::Relaxed),
            self.logs_received.load(Ordering::Relaxed),
            self.unhandled.load(Ordering::Relaxed),
        )
    }
}

/// Build the handler table: `Ping(seq)`, `Pong(seq)` and `Log(text)`.
pub fn registry(invoker: Invoker, stats: Arc<Stats>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    let ping_stats = stats.clone();
    registry.register("Ping", move |(seq,): (i64,)| {
        ping_stats.pings_received.fetch_add(1, Ordering::Relaxed);
        debug!("Ping {} received, answering", seq);
        invoker.invoke("Pong", args![seq])
    });

    let pong_stats = stats.clone();
    registry.register("Pong", move |(seq,): (i64,)| {
        match pong_stats.pong_received(seq) {
            Some(round_trip) => info!("Pong {} after {:?}", seq, round_trip),
            None => info!("Pong {} for a ping we did not send", seq),
        }
        Ok(())
    });

    registry.register("Log", move |(text,): (String,)| {
        stats.logs_received.fetch_add(1, Ordering::Relaxed);
        info!("Peer says: {}", text);
        Ok(())
    });

    registry
}
