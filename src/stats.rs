/// Control block accounting, for diagnosing leaks and double frees.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats
{
    /// Control blocks successfully allocated.
    pub blocks_allocated: usize,

    /// Control blocks returned to the allocator.
    pub blocks_freed: usize,

    /// Payloads handed to their destroyer.
    pub payloads_destroyed: usize,

    /// Control block allocations the allocator refused.
    pub allocation_failures: usize,
}

impl Stats
{
    /// Number of control blocks allocated but not yet freed.
    ///
    /// A block stays live while any `SharedHandle` or `WeakObserver`
    /// refers to it.
    pub fn live_blocks(&self) -> usize { self.blocks_allocated - self.blocks_freed }

    /// Add another record's counts to this one.
    pub fn merge(&mut self, other: &Stats)
    {
        self.blocks_allocated += other.blocks_allocated;
        self.blocks_freed += other.blocks_freed;
        self.payloads_destroyed += other.payloads_destroyed;
        self.allocation_failures += other.allocation_failures;
    }

    /// Counts accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &Stats) -> Stats
    {
        Stats {
            blocks_allocated: self.blocks_allocated - earlier.blocks_allocated,
            blocks_freed: self.blocks_freed - earlier.blocks_freed,
            payloads_destroyed: self.payloads_destroyed - earlier.payloads_destroyed,
            allocation_failures: self.allocation_failures - earlier.allocation_failures,
        }
    }
}
