use std::{
    alloc,
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, Index},
    ptr::{self, NonNull},
};

use crate::{
    control::{ControlBlock, Destroyer},
    error::AllocError,
};

/// Shared owning handle.
///
/// Any number of handles may share one payload. Sharing is accounted for in
/// a separately allocated control block: cloning a handle bumps its strong
/// count, dropping one decrements it, and the last strong owner hands the
/// payload to its destroyer.
///
/// A handle is either _empty_ (no payload, no control block) or _owning_.
/// An owning handle normally has a payload, but adopting a null raw pointer
/// yields one that owns a control block around nothing.
///
/// Counts are plain integers, so handles are neither `Send` nor `Sync`.
pub struct SharedHandle<T>
{
    ptr: Option<NonNull<T>>,
    block: Option<NonNull<ControlBlock<T>>>,
    _owns: PhantomData<T>,
}

impl<T> SharedHandle<T>
{
    /// A handle that owns nothing.
    pub const fn empty() -> Self
    {
        Self {
            ptr: None,
            block: None,
            _owns: PhantomData,
        }
    }

    /// Move `value` to the heap and take first ownership of it.
    pub fn new(value: T) -> Self { Self::from_box(Box::new(value)) }

    /// Take first ownership of a boxed value.
    ///
    /// Aborts through `handle_alloc_error` if the control block cannot be
    /// allocated; see `try_from_box` for the fallible version.
    pub fn from_box(value: Box<T>) -> Self
    {
        Self::adopt_or_abort(Some(NonNull::from(Box::leak(value))), 1, Destroyer::Single)
    }

    /// Take first ownership of a boxed value, handing the box back if the
    /// control block cannot be allocated.
    pub fn try_from_box(value: Box<T>) -> Result<Self, AllocError<Box<T>>>
    {
        let payload = NonNull::from(Box::leak(value));
        Self::adopt(Some(payload), 1, Destroyer::Single)
            .map_err(|e| e.with_payload(unsafe { Box::from_raw(payload.as_ptr()) }))
    }

    /// Take first ownership of a boxed value, disposing of it with
    /// `destroyer` instead of dropping the box.
    ///
    /// If `destroyer` panics, the control block is leaked, as with `Rc`.
    pub fn from_box_with<D>(value: Box<T>, destroyer: D) -> Self
    where
        D: FnOnce(Box<T>) + 'static,
    {
        let destroyer = move |p: NonNull<T>| destroyer(unsafe { Box::from_raw(p.as_ptr()) });
        Self::adopt_or_abort(
            Some(NonNull::from(Box::leak(value))),
            1,
            Destroyer::Custom(Box::new(destroyer)),
        )
    }

    /// Take first ownership of a boxed slice. The handle points at the first
    /// element and indexes the rest; the whole slice is dropped at the end.
    pub fn from_boxed_slice(values: Box<[T]>) -> Self
    {
        let len = values.len();
        let payload = NonNull::from(Box::leak(values)).cast::<T>();
        Self::adopt_or_abort(Some(payload), len, Destroyer::Slice)
    }

    /// Take first ownership of a pointer obtained from `Box::into_raw`.
    ///
    /// A null `ptr` still allocates a control block: the handle owns, counts
    /// and shares nothing, and no destroyer ever runs.
    ///
    /// # Safety
    /// A non-null `ptr` must come from `Box::<T>::into_raw` and must not be
    /// owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self
    {
        let payload = NonNull::new(ptr);
        Self::adopt_or_abort(payload, payload.map_or(0, |_| 1), Destroyer::Single)
    }

    /// Take first ownership of `ptr`, disposing of it with `destroyer`.
    ///
    /// If `destroyer` panics, the control block is leaked, as with `Rc`.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads until `destroyer` is called, and
    /// calling `destroyer` with it must be sound.
    pub unsafe fn from_raw_with<D>(ptr: *mut T, destroyer: D) -> Self
    where
        D: FnOnce(NonNull<T>) + 'static,
    {
        let payload = NonNull::new(ptr);
        Self::adopt_or_abort(
            payload,
            payload.map_or(0, |_| 1),
            Destroyer::Custom(Box::new(destroyer)),
        )
    }

    /// Fallible `from_raw_with`. On failure the caller still owns `ptr` and
    /// `destroyer` has been dropped without being called.
    ///
    /// # Safety
    /// As for `from_raw_with`.
    pub unsafe fn try_from_raw_with<D>(ptr: *mut T, destroyer: D) -> Result<Self, AllocError>
    where
        D: FnOnce(NonNull<T>) + 'static,
    {
        let payload = NonNull::new(ptr);
        Self::adopt(
            payload,
            payload.map_or(0, |_| 1),
            Destroyer::Custom(Box::new(destroyer)),
        )
    }

    /// Take first ownership of `len` contiguous elements starting at `ptr`,
    /// disposing of them with `destroyer`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `len` elements until `destroyer` is
    /// called, and calling `destroyer` with it must be sound.
    pub unsafe fn from_raw_parts_with<D>(ptr: *mut T, len: usize, destroyer: D) -> Self
    where
        D: FnOnce(NonNull<T>) + 'static,
    {
        let payload = NonNull::new(ptr);
        Self::adopt_or_abort(
            payload,
            payload.map_or(0, |_| len),
            Destroyer::Custom(Box::new(destroyer)),
        )
    }

    fn adopt(
        payload: Option<NonNull<T>>, len: usize, destroyer: Destroyer<T>,
    ) -> Result<Self, AllocError>
    {
        let block = ControlBlock::allocate(payload, len, destroyer)?;
        Ok(Self {
            ptr: payload,
            block: Some(block),
            _owns: PhantomData,
        })
    }

    fn adopt_or_abort(payload: Option<NonNull<T>>, len: usize, destroyer: Destroyer<T>) -> Self
    {
        Self::adopt(payload, len, destroyer).unwrap_or_else(|e| alloc::handle_alloc_error(e.layout()))
    }

    // a slice of no elements has a dangling pointer
    fn payload(&self) -> Option<NonNull<T>> { self.ptr.filter(|_| self.len() != 0) }

    fn block(&self) -> Option<&ControlBlock<T>> { self.block.map(|b| unsafe { &*b.as_ptr() }) }

    /// Move-construct: leave this handle empty and return what it held.
    /// Counts are untouched.
    pub fn take(&mut self) -> Self { mem::take(self) }

    /// Move-assign: give up what this handle holds, then take over
    /// everything `other` holds, leaving `other` empty.
    pub fn move_from(&mut self, other: &mut Self)
    {
        self.release();
        self.swap(other);
    }

    /// Give up ownership and become empty. Destroys the payload if this was
    /// its last strong owner.
    pub fn reset(&mut self) { self.release() }

    /// Give up ownership and take first ownership of `value` instead.
    ///
    /// The new control block is allocated before the old ownership is
    /// released.
    pub fn reset_with(&mut self, value: Box<T>) { *self = Self::from_box(value) }

    /// Fallible `reset_with`. On failure this handle is unchanged and the box
    /// is handed back.
    pub fn try_reset_with(&mut self, value: Box<T>) -> Result<(), AllocError<Box<T>>>
    {
        *self = Self::try_from_box(value)?;
        Ok(())
    }

    /// Give up ownership and adopt `ptr` as `from_raw` would. A null `ptr`
    /// leaves the handle empty.
    ///
    /// # Safety
    /// As for `from_raw`.
    pub unsafe fn reset_raw(&mut self, ptr: *mut T)
    {
        if ptr.is_null() {
            self.reset()
        } else {
            *self = Self::from_raw(ptr)
        }
    }

    /// Give up ownership and adopt `ptr` as `from_raw_with` would. A null
    /// `ptr` leaves the handle empty and drops `destroyer` uncalled.
    ///
    /// # Safety
    /// As for `from_raw_with`.
    pub unsafe fn reset_raw_with<D>(&mut self, ptr: *mut T, destroyer: D)
    where
        D: FnOnce(NonNull<T>) + 'static,
    {
        if ptr.is_null() {
            self.reset()
        } else {
            *self = Self::from_raw_with(ptr, destroyer)
        }
    }

    /// Exchange contents with `other`. Counts are untouched.
    pub fn swap(&mut self, other: &mut Self)
    {
        mem::swap(&mut self.ptr, &mut other.ptr);
        mem::swap(&mut self.block, &mut other.block);
    }

    /// Raw payload pointer; null when empty or owning a null payload.
    pub fn as_ptr(&self) -> *const T { self.ptr.map_or(ptr::null(), |p| p.as_ptr()) }

    /// Reference to the payload, if there is one.
    pub fn get(&self) -> Option<&T> { self.payload().map(|p| unsafe { &*p.as_ptr() }) }

    /// Mutable reference to the payload, only if no other strong owner
    /// shares it.
    pub fn get_mut(&mut self) -> Option<&mut T>
    {
        if self.is_unique() {
            self.payload().map(|p| unsafe { &mut *p.as_ptr() })
        } else {
            None
        }
    }

    /// Element at `index` from the payload pointer, without bounds checks.
    ///
    /// # Safety
    /// The handle must have a payload with more than `index` elements.
    pub unsafe fn get_unchecked(&self, index: usize) -> &T { &*self.as_ptr().add(index) }

    /// Number of elements the payload spans: the slice length for slice
    /// payloads, one for single objects, zero without a payload.
    pub fn len(&self) -> usize { self.block().map_or(0, ControlBlock::len) }

    /// Whether the payload spans no elements.
    ///
    /// Counts elements, not ownership: a handle that adopted a null pointer
    /// or an empty slice still owns a control block. Test `use_count() == 0`
    /// for the empty state.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Number of handles sharing this payload, or zero when empty.
    pub fn use_count(&self) -> usize { self.block().map_or(0, ControlBlock::strong) }

    pub fn is_unique(&self) -> bool { self.use_count() == 1 }

    /// Number of `WeakObserver`s registered on this payload's control block.
    pub fn weak_count(&self) -> usize { self.block().map_or(0, ControlBlock::weak) }

    /// Whether both handles share one control block. Two empty handles are
    /// not considered to share anything.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool
    {
        this.block.is_some() && this.block == other.block
    }

    /// Register a weak observer on this payload's control block.
    pub fn downgrade(&self) -> Option<WeakObserver<T>>
    {
        let block = self.block?;
        unsafe { block.as_ref() }.acquire_weak();
        Some(WeakObserver { block })
    }

    fn release(&mut self)
    {
        self.ptr = None;
        if let Some(block) = self.block.take() {
            unsafe { ControlBlock::release_strong(block) }
        }
    }
}

impl<T> Clone for SharedHandle<T>
{
    fn clone(&self) -> Self
    {
        if let Some(block) = self.block() {
            block.acquire_strong();
        }
        Self {
            ptr: self.ptr,
            block: self.block,
            _owns: PhantomData,
        }
    }

    /// Copy-assign: share `source`'s payload, giving up the current one only
    /// after the new share is taken.
    fn clone_from(&mut self, source: &Self)
    {
        let mut copy = source.clone();
        self.swap(&mut copy);
    }
}

impl<T> Drop for SharedHandle<T>
{
    fn drop(&mut self) { self.release() }
}

impl<T> Default for SharedHandle<T>
{
    fn default() -> Self { Self::empty() }
}

impl<T> Deref for SharedHandle<T>
{
    type Target = T;

    fn deref(&self) -> &Self::Target
    {
        match self.get() {
            Some(it) => it,
            None => panic!("dereferenced a SharedHandle without a payload"),
        }
    }
}

impl<T> Index<usize> for SharedHandle<T>
{
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output
    {
        let len = self.len();
        if index >= len {
            panic!("index {index} out of bounds for SharedHandle of {len} elements");
        }
        unsafe { self.get_unchecked(index) }
    }
}

impl<T> From<Box<T>> for SharedHandle<T>
{
    fn from(value: Box<T>) -> Self { Self::from_box(value) }
}

impl<T> From<Box<[T]>> for SharedHandle<T>
{
    fn from(values: Box<[T]>) -> Self { Self::from_boxed_slice(values) }
}

impl<T> fmt::Debug for SharedHandle<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("SharedHandle")
            .field("ptr", &self.as_ptr())
            .field("use_count", &self.use_count())
            .finish()
    }
}

/// Non-owning observer of a control block.
///
/// Keeps the control block, but not the payload, alive. It can report on
/// the payload's owners but never reach the payload itself.
pub struct WeakObserver<T>
{
    block: NonNull<ControlBlock<T>>,
}

impl<T> WeakObserver<T>
{
    fn block(&self) -> &ControlBlock<T> { unsafe { self.block.as_ref() } }

    /// Number of handles still sharing the observed payload.
    pub fn strong_count(&self) -> usize { self.block().strong() }

    /// Number of observers of this control block, this one included.
    pub fn weak_count(&self) -> usize { self.block().weak() }

    /// Whether the observed payload has been destroyed.
    pub fn is_expired(&self) -> bool { self.strong_count() == 0 }
}

impl<T> Clone for WeakObserver<T>
{
    fn clone(&self) -> Self
    {
        self.block().acquire_weak();
        Self { block: self.block }
    }
}

impl<T> Drop for WeakObserver<T>
{
    fn drop(&mut self) { unsafe { ControlBlock::release_weak(self.block) } }
}

impl<T> fmt::Debug for WeakObserver<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("WeakObserver")
            .field("block", &self.block)
            .field("strong_count", &self.strong_count())
            .finish()
    }
}
