use std::{alloc::Layout, fmt};

use thiserror::Error;

/// The allocator refused to provide memory for a control block.
///
/// Carries back the payload the failed operation was about to adopt, so
/// nothing is dropped or leaked on the error path.
#[derive(Error)]
#[error("failed to allocate a control block of {} bytes", .layout.size())]
pub struct AllocError<P = ()>
{
    layout: Layout,
    payload: P,
}

impl<P> AllocError<P>
{
    pub(crate) fn new(layout: Layout, payload: P) -> Self { Self { layout, payload } }

    /// Layout of the control block that could not be allocated.
    pub fn layout(&self) -> Layout { self.layout }

    /// Recover the payload that was not adopted.
    pub fn into_payload(self) -> P { self.payload }

    pub(crate) fn with_payload<Q>(self, payload: Q) -> AllocError<Q>
    {
        AllocError {
            layout: self.layout,
            payload,
        }
    }
}

impl<P> fmt::Debug for AllocError<P>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("AllocError")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
