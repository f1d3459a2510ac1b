use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shmqueue::{QueueConfig, Role, ShmQueue};

#[derive(clap::Parser)]
#[clap()]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmqueue-producer.toml")]
    config: String,
    /// Stop after this many messages instead of running until interrupted.
    #[clap(short = 'n', long = "count")]
    count: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct ProducerConfig {
    queue: QueueConfig,
    min_len: usize,
    max_len: usize,
    backoff_micros: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            queue: QueueConfig::default(),
            min_len: 10,
            max_len: 100,
            backoff_micros: 100,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let opts: Opts = Opts::parse();
    let cfg: ProducerConfig = confy::load_path(&opts.config)?;
    info!(?cfg, "starting producer");

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    let mut queue = ShmQueue::from_config(&cfg.queue, Role::Producer)?;
    let result = run(&mut queue, &cfg, opts.count, &stop);
    queue.destroy()?;
    result
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// `[:]` followed by a random alphanumeric tail.
fn next_message(rng: &mut impl Rng, min_len: usize, max_len: usize) -> String {
    let len = rng.gen_range(min_len.min(max_len)..=max_len.max(min_len));
    let tail: String = rng.sample_iter(&Alphanumeric).take(len).map(char::from).collect();
    format!("[:]{}", tail)
}

fn run(
    queue: &mut ShmQueue,
    cfg: &ProducerConfig,
    count: Option<u64>,
    stop: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let backoff = Duration::from_micros(cfg.backoff_micros);
    let mut rng = rand::thread_rng();
    let mut sent = 0u64;
    let mut full_hits = 0u64;

    'outer: while count.map_or(true, |n| sent < n) {
        let message = next_message(&mut rng, cfg.min_len, cfg.max_len);
        loop {
            if stop.load(Ordering::Relaxed) {
                break 'outer;
            }
            match queue.put(message.as_bytes()) {
                Ok(_) => break,
                Err(e) if e.is_queue_full() => {
                    full_hits += 1;
                    thread::sleep(backoff);
                }
                Err(e) => return Err(Box::new(e)),
            }
        }
        sent += 1;
        if sent % 100_000 == 0 {
            info!(sent, full_hits, stats = %queue.stats()?, "progress");
        }
    }

    if stop.load(Ordering::Relaxed) {
        warn!("interrupted");
    }
    let duration = start.elapsed();
    let rate = (sent as f64) / duration.as_secs_f64().max(f64::EPSILON);
    println!(
        "{} messages written ({:.0} msg/s, queue full {} times). Total time: {:#?}",
        sent, rate, full_hits, duration
    );
    Ok(())
}
