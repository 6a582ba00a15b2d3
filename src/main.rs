use anyhow::{Context, Result, ensure};
use clap::Parser;
use conveyor::{RunConfig, RunStats, SpinWorkload, run};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "conveyor")]
#[command(about = "Bounded-buffer producer/consumer benchmark", long_about = None)]
struct Cli {
    /// Number of producer threads
    producers: usize,
    /// Number of consumer threads
    consumers: usize,
    #[arg(long, default_value_t = 20_000, help = "Items each producer enqueues")]
    items_per_producer: u64,
    #[arg(long, default_value_t = 10, help = "Queue capacity (slots)")]
    capacity: usize,
    #[arg(
        long,
        default_value_t = 10,
        help = "Iterations of the placeholder workload per item"
    )]
    spin_rounds: u32,
    #[arg(long, help = "Write run stats as pretty JSON to this path")]
    stats_json: Option<PathBuf>,
}

fn print_stats(stats: &RunStats) {
    let duration_sec = stats.duration.as_secs_f64().max(0.000_001);
    println!("producers={}", stats.producers);
    println!("consumers={}", stats.consumers);
    println!("items_per_producer={}", stats.items_per_producer);
    println!("capacity={}", stats.capacity);
    println!("duration_sec={:.3}", duration_sec);
    println!("items_consumed={}", stats.queue.consumed);
    println!(
        "throughput_items_per_sec={:.2}",
        stats.throughput_items_per_sec()
    );
    println!("max_occupancy={}", stats.queue.max_occupancy);
    println!("busy_time_sec={:.3}", stats.busy_time.as_secs_f64());
    println!("mean_queueing_delay_us={:.3}", stats.mean_wait_micros());
}

fn write_stats_json(path: &Path, stats: &RunStats) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(stats).context("failed serializing run stats")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("failed writing stats temp file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed atomically moving stats to {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ensure!(cli.producers >= 1, "at least one producer is required");
    ensure!(cli.consumers >= 1, "at least one consumer is required");
    ensure!(cli.capacity >= 1, "queue capacity must be at least 1");

    let config = RunConfig {
        producers: cli.producers,
        consumers: cli.consumers,
        items_per_producer: cli.items_per_producer,
        capacity: cli.capacity,
    };

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    eprintln!(
        "Starting {} producers and {} consumers at {}.",
        cli.producers, cli.consumers, timestamp
    );

    let stats = run(SpinWorkload::new(cli.spin_rounds), config)?;

    print_stats(&stats);
    println!(
        "Producers = {} | Consumers = {} | Avg. queueing delay: {:.6}us",
        stats.producers,
        stats.consumers,
        stats.mean_wait_micros()
    );

    if let Some(path) = cli.stats_json {
        write_stats_json(&path, &stats)?;
    }

    Ok(())
}
