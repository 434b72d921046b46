/// Rate-limited transfer generator
///
/// Transfers cycle through the configured account range: position `p` sends
/// from account `p % count` to `(p + 1) % count` with nonce `p / count`, so
/// every sender's nonces are gapless and strictly increasing.
///
/// The background loop runs in fixed ticks. At the start of each tick it reads
/// the current rate and pushes that many transfers into the output channel,
/// then sleeps out the rest of the tick. A tick that overruns logs a warning
/// and the next one starts immediately.

use crate::account::{Account, SignedTransfer};
use crate::config::{ConfigError, TxStormConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const TRANSFER_AMOUNT: u128 = 1_000_000;
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Generator is already running")]
    AlreadyRunning,

    #[error("Generator is not running")]
    NotRunning,

    #[error("Generator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Global account indices of a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxInfo {
    pub from: u64,
    pub to: u64,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub raw: SignedTransfer,
    pub info: TxInfo,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub ticks: u64,
    pub produced: u64,
}

/// Deterministic transfer sequence
struct Source {
    chain_id: u64,
    offset: u64,
    accounts: Vec<Option<Account>>,
    position: u64,
}

impl Source {
    fn account(&mut self, local: usize) -> &Account {
        let offset = self.offset;
        self.accounts[local].get_or_insert_with(|| Account::derive(local as u64 + offset))
    }

    fn generate(&mut self, position: u64) -> Transaction {
        let count = self.accounts.len() as u64;
        let a = (position % count) as usize;
        let b = ((position + 1) % count) as usize;
        let chain_id = self.chain_id;
        let to = self.account(b).clone();
        let raw = self
            .account(a)
            .transfer_to(&to, position / count, TRANSFER_AMOUNT, chain_id);
        Transaction {
            raw,
            info: TxInfo {
                from: a as u64 + self.offset,
                to: b as u64 + self.offset,
            },
        }
    }

    fn yield_tx(&mut self) -> Transaction {
        let tx = self.generate(self.position);
        self.position += 1;
        tx
    }
}

/// Adjusts the rate of a running or idle generator
#[derive(Clone)]
pub struct RateHandle {
    rate: Arc<watch::Sender<u32>>,
}

impl RateHandle {
    /// Fractional rates round up
    pub fn set_tps(&self, tps: f64) {
        let rate = if tps.is_finite() && tps > 0.0 {
            tps.ceil().min(u32::MAX as f64) as u32
        } else {
            0
        };
        self.rate.send_replace(rate);
    }

    pub fn tps(&self) -> f64 {
        *self.rate.borrow() as f64
    }
}

/// Receiving end of a started generator
pub struct TxStream {
    rx: mpsc::Receiver<Transaction>,
}

impl TxStream {
    /// Returns `None` once the generator stopped and the buffer is drained
    pub async fn recv(&mut self) -> Option<Transaction> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Transaction> {
        self.rx.try_recv().ok()
    }
}

struct Running {
    stop: oneshot::Sender<()>,
    task: JoinHandle<(Source, GeneratorStats)>,
}

pub struct Generator {
    source: Option<Source>,
    rate: RateHandle,
    tick: Duration,
    buffer: usize,
    running: Option<Running>,
}

impl Generator {
    /// Generator for a validated config, stopped at rate `config.tps`
    pub fn new(config: &TxStormConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let rate = RateHandle {
            rate: Arc::new(watch::channel(0).0),
        };
        rate.set_tps(config.tps);
        Ok(Self {
            source: Some(Source {
                chain_id: config.chain_id,
                offset: config.accounts.offset as u64,
                accounts: vec![None; config.accounts.count as usize],
                position: 0,
            }),
            rate,
            tick: DEFAULT_TICK,
            buffer: config.buffer,
            running: None,
        })
    }

    /// Length of one rate period; the rate applies per tick
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn rate(&self) -> RateHandle {
        self.rate.clone()
    }

    pub fn set_tps(&self, tps: f64) {
        self.rate.set_tps(tps);
    }

    pub fn tps(&self) -> f64 {
        self.rate.tps()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Next transfer in the sequence, for synchronous use while stopped
    pub fn yield_tx(&mut self) -> Result<Transaction> {
        match self.source.as_mut() {
            Some(source) => Ok(source.yield_tx()),
            None => Err(GeneratorError::AlreadyRunning),
        }
    }

    pub fn start(&mut self) -> Result<(TxStream, RateHandle)> {
        let source = self.source.take().ok_or(GeneratorError::AlreadyRunning)?;
        info!(
            accounts = source.accounts.len(),
            from = source.offset,
            to = source.offset + source.accounts.len() as u64,
            "Tx generator will use accounts"
        );

        let (tx, rx) = mpsc::channel(self.buffer);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            source,
            tx,
            self.rate.rate.subscribe(),
            self.tick,
            stop_rx,
        ));
        self.running = Some(Running {
            stop: stop_tx,
            task,
        });
        Ok((TxStream { rx }, self.rate.clone()))
    }

    /// Stops the loop and waits for it. The sequence resumes where it left off
    /// on the next start.
    pub async fn stop(&mut self) -> Result<GeneratorStats> {
        let running = self.running.take().ok_or(GeneratorError::NotRunning)?;
        // The loop may already have exited on a closed stream
        let _ = running.stop.send(());
        let (source, stats) = running.task.await?;
        self.source = Some(source);
        Ok(stats)
    }
}

async fn run(
    mut source: Source,
    out: mpsc::Sender<Transaction>,
    rate: watch::Receiver<u32>,
    tick: Duration,
    mut stop: oneshot::Receiver<()>,
) -> (Source, GeneratorStats) {
    info!("Tx generator started");
    let mut stats = GeneratorStats::default();

    'ticks: loop {
        let started = Instant::now();
        let tps = *rate.borrow();
        stats.ticks += 1;

        for _ in 0..tps {
            let position = source.position;
            let tx = source.generate(position);
            tokio::select! {
                _ = &mut stop => break 'ticks,
                sent = out.send(tx) => {
                    if sent.is_err() {
                        debug!("Tx stream closed by consumer");
                        break 'ticks;
                    }
                    source.position += 1;
                    stats.produced += 1;
                }
            }
        }

        let spent = started.elapsed();
        if spent >= tick {
            warn!(tps, spent_ms = spent.as_millis() as u64, "Tx generator exceeded performance");
            continue;
        }

        tokio::select! {
            _ = &mut stop => break 'ticks,
            _ = tokio::time::sleep(tick - spent) => {}
        }
    }

    info!(ticks = stats.ticks, produced = stats.produced, "Tx generator stopped");
    (source, stats)
}
