use anyhow::{bail, Context, Result};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;
use txstorm::{Generator, TxStormConfig};

const DEFAULT_SECONDS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: txstorm <config.json> [seconds]");
    };
    let seconds = match args.next() {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("invalid duration {arg:?}"))?,
        None => DEFAULT_SECONDS,
    };

    let config = TxStormConfig::from_json_file(&path)
        .with_context(|| format!("loading {path}"))?;
    info!(
        chain_id = config.chain_id,
        accounts = config.accounts.count,
        tps = config.tps,
        "Loaded config"
    );

    let mut generator = Generator::new(&config)?;
    let (mut stream, _rate) = generator.start()?;
    let started = Instant::now();

    let consumer = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(tx) = stream.recv().await {
            received += 1;
            tracing::trace!(from = tx.info.from, to = tx.info.to, id = %tx.raw.id(), "tx");
        }
        received
    });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let stats = generator.stop().await?;
    let received = consumer.await?;
    let elapsed = started.elapsed().as_secs_f64();
    info!(
        ticks = stats.ticks,
        produced = stats.produced,
        received,
        tps = received as f64 / elapsed.max(f64::EPSILON),
        "Done"
    );
    Ok(())
}
