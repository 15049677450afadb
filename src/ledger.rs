use std::cell::Cell;

#[cfg(feature = "global")]
use lazy_static::lazy_static;
#[cfg(feature = "global")]
use parking_lot::Mutex;

use crate::stats::Stats;

struct LocalLedger
{
    stats: Cell<Stats>,
}

impl LocalLedger
{
    fn record(&self, f: fn(&mut Stats))
    {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

thread_local! {
    static LOCAL_LEDGER : LocalLedger = LocalLedger { stats: Cell::new(Stats::default()) };
}

#[cfg(feature = "global")]
lazy_static! {
    static ref GLOBAL_LEDGER : Mutex<Stats> = Mutex::new(Stats::default());
}

#[cfg(feature = "global")]
impl Drop for LocalLedger
{
    fn drop(&mut self) { GLOBAL_LEDGER.lock().merge(self.stats.get_mut()) }
}

// handles dropped by other thread-local destructors may outlive the ledger
fn record(f: fn(&mut Stats)) { let _ = LOCAL_LEDGER.try_with(|l| l.record(f)); }

pub(crate) fn block_allocated() { record(|s| s.blocks_allocated += 1) }
pub(crate) fn block_freed() { record(|s| s.blocks_freed += 1) }
pub(crate) fn payload_destroyed() { record(|s| s.payloads_destroyed += 1) }
pub(crate) fn allocation_failed() { record(|s| s.allocation_failures += 1) }

/// Control block statistics of the calling thread.
pub fn thread_local_stats() -> Stats
{
    LOCAL_LEDGER
        .try_with(|l| l.stats.get())
        .unwrap_or_default()
}

/// Control block statistics accumulated by every thread that has exited.
///
/// Threads merge their local record into the global one on exit, so the
/// calling thread's own activity is not included.
#[cfg(feature = "global")]
pub fn global_stats() -> Stats { *GLOBAL_LEDGER.lock() }
