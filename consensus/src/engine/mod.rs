/// Consensus Engine - async front of the poset
///
/// One tokio task owns the `Poset` and processes submitted events strictly
/// one at a time from a bounded queue. After every step it:
/// - appends new finalized blocks to the shared block log
/// - hands them to the optional `FinalitySink`
/// - publishes an immutable `PosetSnapshot` on a watch channel
///
/// Readers never touch the poset itself.

use crate::config::EngineConfig;
use crate::crypto::Hash;
use crate::dag::Event;
use crate::election::ElectionStatus;
use crate::frame::Frame;
use crate::poset::{ConsensusError, FinalizedBlock, Poset, ProcessedEvent};
use crate::validators::ValidatorId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Engine stopped")]
    Stopped,

    #[error("Finality sink error: {0}")]
    Sink(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Downstream consumer of finalized blocks
#[async_trait]
pub trait FinalitySink: Send + Sync {
    /// Called once per block, in log order
    async fn deliver(&self, block: &FinalizedBlock) -> std::result::Result<(), SinkError>;
}

/// Read-only view published after every processing step
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PosetSnapshot {
    pub events: usize,
    pub last_frame: Frame,
    pub last_decided_frame: Frame,
    pub election: ElectionStatus,
    pub blocks: u64,
    pub last_atropos: Option<Hash>,
    pub cheaters: Vec<ValidatorId>,
}

impl PosetSnapshot {
    pub fn capture(poset: &Poset) -> Self {
        Self {
            events: poset.len(),
            last_frame: poset.last_frame(),
            last_decided_frame: poset.last_decided_frame(),
            election: poset.election_status(),
            blocks: poset.blocks().len() as u64,
            last_atropos: poset.blocks().last().map(|b| b.atropos),
            cheaters: poset.cheaters(),
        }
    }
}

/// Append-only finalized block log shared with readers
type BlockLog = Arc<RwLock<Vec<FinalizedBlock>>>;

enum Command {
    Submit {
        event: Event,
        reply: oneshot::Sender<Result<ProcessedEvent>>,
    },
    Shutdown,
}

/// Cloneable submission and read handle
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<PosetSnapshot>>,
    log: BlockLog,
}

impl EngineHandle {
    /// Queue an event and wait for its processing result
    pub async fn submit_event(&self, event: Event) -> Result<ProcessedEvent> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { event, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)?
    }

    pub fn snapshot(&self) -> Arc<PosetSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PosetSnapshot>> {
        self.snapshots.clone()
    }

    /// Cursor over the finalized log starting at block `from`
    pub fn cursor(&self, from: u64) -> BlockCursor {
        BlockCursor {
            log: self.log.clone(),
            snapshots: self.snapshots.clone(),
            next: from,
        }
    }
}

/// Lazy reader of the finalized block log
///
/// Can be restarted at any index; consumers that persist their position get
/// at-least-once delivery.
pub struct BlockCursor {
    log: BlockLog,
    snapshots: watch::Receiver<Arc<PosetSnapshot>>,
    next: u64,
}

impl BlockCursor {
    /// Index of the next block to be returned
    pub fn position(&self) -> u64 {
        self.next
    }

    pub fn seek(&mut self, index: u64) {
        self.next = index;
    }

    /// Next block if already finalized
    pub async fn try_next(&mut self) -> Option<FinalizedBlock> {
        let log = self.log.read().await;
        let block = log.get(self.next as usize).cloned();
        if block.is_some() {
            self.next += 1;
        }
        block
    }

    /// Wait for the next block; `None` once the engine stopped and the log
    /// is exhausted
    pub async fn next(&mut self) -> Option<FinalizedBlock> {
        loop {
            let _ = self.snapshots.borrow_and_update();
            if let Some(block) = self.try_next().await {
                return Some(block);
            }
            if self.snapshots.changed().await.is_err() {
                return self.try_next().await;
            }
        }
    }
}

/// Running engine: the processing task plus a handle to it
pub struct ConsensusEngine {
    handle: EngineHandle,
    task: JoinHandle<Poset>,
}

impl ConsensusEngine {
    pub fn spawn(
        poset: Poset,
        config: &EngineConfig,
        sink: Option<Arc<dyn FinalitySink>>,
    ) -> Self {
        let (commands, inbound) = mpsc::channel(config.inbound_capacity.max(1));
        let (publisher, snapshots) = watch::channel(Arc::new(PosetSnapshot::capture(&poset)));
        let log: BlockLog = Arc::new(RwLock::new(poset.blocks().to_vec()));

        let processor = Processor {
            poset,
            inbound,
            publisher,
            log: log.clone(),
            sink,
        };
        let task = tokio::spawn(processor.run());
        info!("Consensus engine started");

        Self {
            handle: EngineHandle {
                commands,
                snapshots,
                log,
            },
            task,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub async fn submit_event(&self, event: Event) -> Result<ProcessedEvent> {
        self.handle.submit_event(event).await
    }

    pub fn snapshot(&self) -> Arc<PosetSnapshot> {
        self.handle.snapshot()
    }

    pub fn cursor(&self, from: u64) -> BlockCursor {
        self.handle.cursor(from)
    }

    /// Stop accepting events, finish the in-flight step and return the poset
    pub async fn shutdown(self) -> Result<Poset> {
        // Fails only if the task is already gone; joining reports that
        let _ = self.handle.commands.send(Command::Shutdown).await;
        drop(self.handle);
        self.task.await.map_err(|e| {
            warn!("Consensus engine task failed: {}", e);
            EngineError::Stopped
        })
    }
}

struct Processor {
    poset: Poset,
    inbound: mpsc::Receiver<Command>,
    publisher: watch::Sender<Arc<PosetSnapshot>>,
    log: BlockLog,
    sink: Option<Arc<dyn FinalitySink>>,
}

impl Processor {
    async fn run(mut self) -> Poset {
        while let Some(command) = self.inbound.recv().await {
            match command {
                Command::Submit { event, reply } => {
                    let result = self.step(event).await;
                    if reply.send(result).is_err() {
                        debug!("Submitter went away before the reply");
                    }
                }
                Command::Shutdown => {
                    self.inbound.close();
                    while let Ok(pending) = self.inbound.try_recv() {
                        if let Command::Submit { reply, .. } = pending {
                            let _ = reply.send(Err(EngineError::Stopped));
                        }
                    }
                    break;
                }
            }
        }
        info!("Consensus engine stopped after {} events", self.poset.len());
        self.poset
    }

    async fn step(&mut self, event: Event) -> Result<ProcessedEvent> {
        let published = self.log.read().await.len() as u64;
        let result = self.poset.process_event(event).map_err(EngineError::from);

        // Blocks finalized by a fork are kept too, so read them from the poset
        let fresh = self.poset.blocks_from(published).to_vec();
        let mut outcome = result;
        if !fresh.is_empty() {
            self.log.write().await.extend(fresh.iter().cloned());
            if let Err(e) = self.deliver(&fresh).await {
                warn!("Finality sink rejected a block: {}", e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        self.publisher
            .send_replace(Arc::new(PosetSnapshot::capture(&self.poset)));
        outcome
    }

    async fn deliver(&self, blocks: &[FinalizedBlock]) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        for block in blocks {
            sink.deliver(block).await?;
        }
        Ok(())
    }
}
