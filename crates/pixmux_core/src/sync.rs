//! CPU/GPU synchronization bookkeeping
//!
//! Done flushes without waiting and clears `synced`. A wait marker only
//! records that the caller has synchronized; work submitted by flush is already
//! ordered ahead of any later CPU access through a lock.

/// Operations issued since the last wait marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub solid: u32,
    pub copy: u32,
    pub conversions: u32,
    pub composite: u32,
    pub access: u32,
    pub upload: u32,
    pub download: u32,
}

#[derive(Debug)]
pub struct SyncController {
    synced: bool,
    counters: OpCounters,
}

impl Default for SyncController {
    fn default() -> Self {
        Self {
            synced: true,
            counters: OpCounters::default(),
        }
    }
}

impl SyncController {
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn counters(&self) -> OpCounters {
        self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut OpCounters {
        &mut self.counters
    }

    /// Work was submitted that the caller has not waited for.
    pub(crate) fn mark_pending(&mut self) {
        self.synced = false;
    }

    /// Returns `false` when already synchronized.
    pub fn wait_marker(&mut self) -> bool {
        if self.synced {
            return false;
        }
        let c = std::mem::take(&mut self.counters);
        tracing::debug!(
            "sync: solid={} copy={} conv={} composite={} access={} upload={} download={}",
            c.solid,
            c.copy,
            c.conversions,
            c.composite,
            c.access,
            c.upload,
            c.download
        );
        self.synced = true;
        true
    }
}
