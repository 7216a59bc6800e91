use thiserror::Error;
use tracing::debug;

use pulse_symbolize::{BacktraceEntry, SymbolizeError};

use crate::artifact::Artifact;
use crate::embedding::EmbeddingMap;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("device connection: {0}")]
    Io(#[from] std::io::Error),

    #[error("device incompatible: {0}")]
    Incompatible(String),

    #[error("device protocol: {0}")]
    Protocol(String),

    #[error("remote fault: {name}")]
    RemoteFault {
        name: String,
        backtrace: Vec<BacktraceEntry>,
    },
}

/// Per-run fault-address resolver handed to the serve phase. Closes
/// over the artifact that was just loaded.
pub type SymbolizeFn<'a> = dyn Fn(&[u64]) -> Result<Vec<BacktraceEntry>, SymbolizeError> + 'a;

/// Device communication collaborator. One kernel execution in flight
/// at a time; for each run the session calls `check_system_info` (first
/// run only), then `load`, `run`, `serve` in that order. The timeline
/// reads ride the same wire — they are direct pass-throughs to remote
/// hardware state with no local caching.
pub trait DeviceChannel {
    /// One-time handshake confirming the device accepts the artifact
    /// format about to be used.
    fn check_system_info(&mut self) -> Result<(), ChannelError>;

    fn load(&mut self, artifact: &Artifact) -> Result<(), ChannelError>;

    fn run(&mut self) -> Result<(), ChannelError>;

    /// Report phase: dispatch host callbacks through `embedding` and
    /// resolve fault addresses through `symbolize` until the kernel
    /// finishes.
    fn serve(
        &mut self,
        embedding: &EmbeddingMap,
        symbolize: &SymbolizeFn<'_>,
    ) -> Result<(), ChannelError>;

    fn close(&mut self) -> Result<(), ChannelError>;

    /// Reinitialize the remote timeline hardware.
    fn timeline_init(&mut self) -> Result<(), ChannelError>;

    /// Current hardware timeline counter, in machine units.
    fn counter(&mut self) -> Result<i64, ChannelError>;

    /// Whether the given remote destination is up.
    fn destination_status(&mut self, destination: i32) -> Result<bool, ChannelError>;
}

/// Stand-in channel for sessions with no device attached: every
/// operation logs and succeeds, and the counter self-advances so
/// timeline code can be exercised offline.
#[derive(Debug)]
pub struct NullChannel {
    counter: i64,
    step: i64,
}

impl NullChannel {
    pub fn new() -> Self {
        Self {
            counter: 0,
            step: 8,
        }
    }
}

impl Default for NullChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceChannel for NullChannel {
    fn check_system_info(&mut self) -> Result<(), ChannelError> {
        debug!("null channel: system info check");
        Ok(())
    }

    fn load(&mut self, artifact: &Artifact) -> Result<(), ChannelError> {
        debug!(size = artifact.len(), "null channel: load");
        Ok(())
    }

    fn run(&mut self) -> Result<(), ChannelError> {
        debug!("null channel: run");
        Ok(())
    }

    fn serve(
        &mut self,
        embedding: &EmbeddingMap,
        _symbolize: &SymbolizeFn<'_>,
    ) -> Result<(), ChannelError> {
        debug!(objects = embedding.object_count(), "null channel: serve");
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        debug!("null channel: close");
        Ok(())
    }

    fn timeline_init(&mut self) -> Result<(), ChannelError> {
        debug!("null channel: timeline init");
        self.counter = 0;
        Ok(())
    }

    fn counter(&mut self) -> Result<i64, ChannelError> {
        self.counter += self.step;
        Ok(self.counter)
    }

    fn destination_status(&mut self, _destination: i32) -> Result<bool, ChannelError> {
        Ok(true)
    }
}
