//! Completion bridge: forwards engine block completions into the notifier.

use crate::engine::{DecodeEngine, ReadyEvent};
use crate::ready::ReadyBlocks;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Why the bridge thread stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The engine reported it is exiting.
    EngineExiting,
    /// The engine reported a block number the notifier does not know.
    ProtocolViolation(u8),
    /// The bridge thread panicked.
    Panicked,
}

/// Handle to the running bridge thread.
#[derive(Debug)]
pub struct Bridge {
    thread: JoinHandle<BridgeExit>,
}

impl Bridge {
    /// Start the bridge thread for `engine`, marking completions on `ready`.
    pub fn spawn<E: DecodeEngine>(engine: Arc<E>, ready: Arc<ReadyBlocks>) -> std::io::Result<Self> {
        let thread = std::thread::Builder::new()
            .name("rqlink-ready-blocks".into())
            .spawn(move || run(engine.as_ref(), &ready))?;
        Ok(Self { thread })
    }

    /// Wait for the bridge to stop. Only returns once the engine has
    /// reported [`ReadyEvent::Exiting`] or the bridge hit a violation.
    pub fn join(self) -> BridgeExit {
        let exit = self.thread.join().unwrap_or(BridgeExit::Panicked);
        match exit {
            BridgeExit::EngineExiting => debug!("ready-block bridge exited"),
            BridgeExit::ProtocolViolation(sbn) => {
                warn!(sbn, "ready-block bridge stopped: engine reported unknown block")
            }
            BridgeExit::Panicked => warn!("ready-block bridge panicked"),
        }
        exit
    }
}

fn run<E: DecodeEngine + ?Sized>(engine: &E, ready: &ReadyBlocks) -> BridgeExit {
    loop {
        match engine.wait_ready_block() {
            ReadyEvent::Block(sbn) => {
                if ready.mark_ready(sbn).is_err() {
                    return BridgeExit::ProtocolViolation(sbn);
                }
            }
            ReadyEvent::Exiting => return BridgeExit::EngineExiting,
        }
    }
}
