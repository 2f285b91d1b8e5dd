//! BridgeActor - serialized access to the session bridge
//!
//! The bridge is not shareable: inbound MIDI (midir's thread), sync loop
//! ticks and config reloads all arrive as commands on one channel and run
//! one at a time on the actor task. Host notifications are drained by the
//! MIDI and tick commands.
//!
//! Fire-and-forget methods on [`BridgeHandle`] for the MIDI hot path, and
//! async methods with oneshot replies for ticks, status and shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::bridge::{BridgeOptions, BridgeStatus, SessionBridge};
use crate::config::AppConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::host::SessionHost;
use crate::sync_loop::Tick;
use crate::transport::MidiSink;

/// Commands for the bridge actor
#[derive(Debug)]
pub enum BridgeCommand {
    /// Raw MIDI from the companion app
    Midi(Vec<u8>),
    /// One sync loop firing
    Tick {
        response: oneshot::Sender<BridgeResult<()>>,
    },
    Reconfigure(Box<AppConfig>),
    Status {
        response: oneshot::Sender<BridgeStatus>,
    },
    /// Detach all listeners and stop the actor
    Shutdown { response: oneshot::Sender<()> },
}

pub struct BridgeActor<H: SessionHost> {
    bridge: SessionBridge<H>,
    command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
    processed: u64,
}

impl<H: SessionHost + 'static> BridgeActor<H> {
    /// Spawn the actor on the current runtime and return its handle.
    ///
    /// The bridge's sync loop is wired to tick through the actor, so a tick
    /// never runs concurrently with any other entry point.
    pub fn spawn(host: H, sink: Arc<dyn MidiSink>, options: BridgeOptions) -> BridgeHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut bridge = SessionBridge::new(host, sink, options);
        bridge.set_ticker(Arc::new(ActorTicker {
            cmd_tx: cmd_tx.downgrade(),
        }));

        let actor = BridgeActor {
            bridge,
            command_rx: cmd_rx,
            processed: 0,
        };
        tokio::spawn(actor.run());

        info!("BridgeActor spawned");
        BridgeHandle::new(cmd_tx)
    }

    /// Process commands until shutdown or until every handle is gone
    async fn run(mut self) {
        debug!("BridgeActor run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");
            self.processed += 1;

            match cmd {
                BridgeCommand::Midi(bytes) => self.bridge.handle_midi(&bytes),
                BridgeCommand::Tick { response } => {
                    let _ = response.send(self.bridge.tick());
                }
                BridgeCommand::Reconfigure(config) => {
                    self.bridge.reconfigure(&config);
                    debug!("Bridge reconfigured");
                }
                BridgeCommand::Status { response } => {
                    let _ = response.send(self.bridge.status());
                }
                BridgeCommand::Shutdown { response } => {
                    info!("BridgeActor received shutdown command");
                    self.bridge.teardown();
                    let _ = response.send(());
                    return;
                }
            }
        }

        warn!("All bridge handles dropped, tearing down");
        self.bridge.teardown();
        info!(commands = self.processed, "BridgeActor stopped");
    }
}

/// Sync loop work that runs inside the actor. Holds a weak sender so the
/// loop alone does not keep the actor alive.
struct ActorTicker {
    cmd_tx: mpsc::WeakUnboundedSender<BridgeCommand>,
}

#[async_trait]
impl Tick for ActorTicker {
    async fn tick(&self) -> BridgeResult<()> {
        let cmd_tx = self.cmd_tx.upgrade().ok_or(BridgeError::ActorClosed)?;
        let (response, rx) = oneshot::channel();
        cmd_tx
            .send(BridgeCommand::Tick { response })
            .map_err(|_| BridgeError::ActorClosed)?;
        drop(cmd_tx);

        rx.await.map_err(|_| BridgeError::ActorClosed)?
    }
}

/// Handle for talking to a running [`BridgeActor`]
#[derive(Clone)]
pub struct BridgeHandle {
    cmd_tx: mpsc::UnboundedSender<BridgeCommand>,
}

impl BridgeHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<BridgeCommand>) -> Self {
        Self { cmd_tx }
    }

    // Hot path (fire-and-forget)

    /// Forward inbound MIDI. Safe to call from midir's callback thread.
    pub fn midi(&self, bytes: Vec<u8>) {
        let _ = self.cmd_tx.send(BridgeCommand::Midi(bytes));
    }

    pub fn reconfigure(&self, config: AppConfig) {
        let _ = self.cmd_tx.send(BridgeCommand::Reconfigure(Box::new(config)));
    }

    // Request-response

    /// Run one sync tick now and wait for its result
    pub async fn tick(&self) -> BridgeResult<()> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(BridgeCommand::Tick { response })
            .map_err(|_| BridgeError::ActorClosed)?;
        rx.await.map_err(|_| BridgeError::ActorClosed)?
    }

    pub async fn status(&self) -> BridgeResult<BridgeStatus> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(BridgeCommand::Status { response })
            .map_err(|_| BridgeError::ActorClosed)?;
        rx.await.map_err(|_| BridgeError::ActorClosed)
    }

    /// Tear the bridge down and wait until the actor has stopped
    pub async fn shutdown(&self) -> BridgeResult<()> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(BridgeCommand::Shutdown { response })
            .map_err(|_| BridgeError::ActorClosed)?;
        rx.await.map_err(|_| BridgeError::ActorClosed)
    }
}
