use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use shmqueue::{QueueConfig, Role, ShmQueue};

#[derive(clap::Parser)]
#[clap()]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmqueue-consumer.toml")]
    config: String,
    /// Only attach to a queue some producer already created.
    #[clap(long = "attach")]
    attach: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct ConsumerConfig {
    queue: QueueConfig,
    max_len: usize,
    wait_millis: u64,
    poll_micros: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            queue: QueueConfig::default(),
            max_len: 200,
            wait_millis: 100,
            poll_micros: 200,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let opts: Opts = Opts::parse();
    let cfg: ConsumerConfig = confy::load_path(&opts.config)?;
    info!(?cfg, attach = opts.attach, "starting consumer");

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    let mut queue = if opts.attach {
        ShmQueue::attach(cfg.queue.identifier(), cfg.queue.capacity, Role::Consumer)?
    } else {
        ShmQueue::from_config(&cfg.queue, Role::Consumer)?
    };
    let result = run(&mut queue, &cfg, &stop);
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

fn run(queue: &mut ShmQueue, cfg: &ConsumerConfig, stop: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let wait = Duration::from_millis(cfg.wait_millis);
    let poll = Duration::from_micros(cfg.poll_micros);
    let mut received = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let message = queue.get_timeout(cfg.max_len, wait, poll)?;
        if message.is_empty() {
            debug!(stats = %queue.stats()?, "queue idle");
            continue;
        }
        received += 1;
        println!("{}", String::from_utf8_lossy(&message));
    }

    let duration = start.elapsed();
    info!(received, ?duration, "consumer stopped");
    Ok(())
}
