use std::{
    alloc::{self, Layout},
    cell::Cell,
    fmt,
    ptr::{self, NonNull},
};

use log::{trace, warn};

use crate::{error::AllocError, ledger};

/// How a payload is disposed of once its last strong owner lets go.
pub(crate) enum Destroyer<T>
{
    /// Payload came from `Box<T>`.
    Single,
    /// Payload is the first element of a `Box<[T]>` of the block's length.
    Slice,
    Custom(Box<dyn FnOnce(NonNull<T>)>),
}

impl<T> Destroyer<T>
{
    unsafe fn destroy(self, payload: NonNull<T>, len: usize)
    {
        match self {
            Self::Single => drop(Box::from_raw(payload.as_ptr())),
            Self::Slice => drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                payload.as_ptr(),
                len,
            ))),
            Self::Custom(f) => f(payload),
        }
    }
}

impl<T> fmt::Debug for Destroyer<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Single => f.write_str("Single"),
            Self::Slice => f.write_str("Slice"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Shared ownership record for one payload.
///
/// Lives in its own allocation, separate from the payload. Born with a
/// strong count of one and freed once both counts reach zero.
pub(crate) struct ControlBlock<T>
{
    strong: Cell<usize>,
    weak: Cell<usize>,
    payload: Option<NonNull<T>>,
    len: usize,
    destroyer: Cell<Option<Destroyer<T>>>,
}

impl<T> ControlBlock<T>
{
    /// Allocate a block owning `payload`, with one strong reference.
    ///
    /// On failure nothing has been adopted; the caller still owns `payload`.
    pub(crate) fn allocate(
        payload: Option<NonNull<T>>, len: usize, destroyer: Destroyer<T>,
    ) -> Result<NonNull<Self>, AllocError>
    {
        let layout = Layout::new::<Self>();
        let raw = unsafe { alloc::alloc(layout) } as *mut Self;

        let Some(block) = NonNull::new(raw) else {
            warn!("control block allocation of {} bytes failed", layout.size());
            ledger::allocation_failed();
            return Err(AllocError::new(layout, ()));
        };

        unsafe {
            block.as_ptr().write(Self {
                strong: Cell::new(1),
                weak: Cell::new(0),
                payload,
                len,
                destroyer: Cell::new(Some(destroyer)),
            });
        }

        trace!("allocated control block {:p} for payload {:?}", block, payload);
        ledger::block_allocated();
        Ok(block)
    }

    pub(crate) fn strong(&self) -> usize { self.strong.get() }

    pub(crate) fn weak(&self) -> usize { self.weak.get() }

    pub(crate) fn len(&self) -> usize { self.len }

    pub(crate) fn acquire_strong(&self) { self.strong.set(Self::increment(self.strong.get())) }

    pub(crate) fn acquire_weak(&self) { self.weak.set(Self::increment(self.weak.get())) }

    fn increment(n: usize) -> usize { n.checked_add(1).unwrap_or_else(|| std::process::abort()) }

    /// Give up one strong reference. The last one destroys the payload, and
    /// frees the block too when no weak references remain.
    ///
    /// A panicking destroyer unwinds past the implicit weak reference and
    /// leaks the block.
    ///
    /// # Safety
    /// `this` must be live and the caller must hold the strong reference it
    /// is giving up.
    pub(crate) unsafe fn release_strong(this: NonNull<Self>)
    {
        let block = this.as_ref();
        let strong = block.strong.get() - 1;
        block.strong.set(strong);

        if strong != 0 {
            return;
        }

        // implicit weak reference held for the duration of the destroyer
        block.acquire_weak();
        block.destroy_payload();
        Self::release_weak(this);
    }

    /// Give up one weak reference, freeing the block if it was the last
    /// reference of any kind.
    ///
    /// # Safety
    /// `this` must be live and the caller must hold the weak reference it is
    /// giving up.
    pub(crate) unsafe fn release_weak(this: NonNull<Self>)
    {
        let block = this.as_ref();
        let weak = block.weak.get() - 1;
        block.weak.set(weak);

        if weak == 0 && block.strong.get() == 0 {
            Self::deallocate(this);
        }
    }

    fn destroy_payload(&self)
    {
        let Some(destroyer) = self.destroyer.take() else {
            return;
        };

        if let Some(payload) = self.payload {
            trace!("destroying payload {:p} with {:?} destroyer", payload, destroyer);
            unsafe { destroyer.destroy(payload, self.len) };
            ledger::payload_destroyed();
        }
    }

    unsafe fn deallocate(this: NonNull<Self>)
    {
        trace!("freeing control block {:p}", this);
        ptr::drop_in_place(this.as_ptr());
        alloc::dealloc(this.as_ptr().cast(), Layout::new::<Self>());
        ledger::block_freed();
    }
}
