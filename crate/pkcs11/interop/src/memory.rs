//! Unmanaged memory handed to PKCS#11 modules.
//!
//! An [`UnmanagedBuffer`] is a zero-filled heap block with a stable address that
//! a module may read or write through a raw pointer. It has exactly one owner,
//! is freed exactly once (explicitly with [`UnmanagedBuffer::free`] or on drop)
//! and is wiped before release. Buffers hold a raw pointer and are therefore
//! neither `Send` nor `Sync`: they are allocated and released on one thread.

use std::{
    alloc::{self, Layout},
    cell::Cell,
    fmt,
    mem::size_of,
    ptr, slice,
};

use cosmian_pkcs11_sys::{CK_ULONG, CK_VOID_PTR};
use zeroize::Zeroize;

use crate::{InteropError, InteropResult};

/// Alignment of every allocation: enough for any PKCS#11 record.
const ALIGNMENT: usize = 16;

thread_local! {
    static LIVE_ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

/// Number of unmanaged allocations made by the current thread and not yet freed.
#[must_use]
pub fn live_allocations() -> usize {
    LIVE_ALLOCATIONS.with(Cell::get)
}

/// Native size of `T` as a `CK_ULONG`.
pub fn ck_size_of<T>() -> InteropResult<CK_ULONG> {
    Ok(CK_ULONG::try_from(size_of::<T>())?)
}

pub struct UnmanagedBuffer {
    /// Null if and only if `len == 0`.
    ptr: *mut u8,
    len: usize,
    ck_len: CK_ULONG,
}

impl UnmanagedBuffer {
    /// A buffer with no memory behind it: null pointer, zero length.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
            ck_len: 0,
        }
    }

    /// Allocate `size` zeroed bytes.
    ///
    /// A negative size, or one that does not fit a `CK_ULONG`, is an
    /// [`InteropError::Allocation`] error. A zero size yields [`Self::empty`].
    pub fn allocate<S>(size: S) -> InteropResult<Self>
    where
        S: TryInto<usize> + Copy + fmt::Display,
    {
        let len: usize = size
            .try_into()
            .map_err(|_| InteropError::Allocation(format!("invalid buffer size: {size}")))?;
        if len == 0 {
            return Ok(Self::empty());
        }
        let ck_len = CK_ULONG::try_from(len).map_err(|_| {
            InteropError::Allocation(format!("{len} bytes do not fit a CK_ULONG length"))
        })?;
        let layout = Self::layout(len)?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(InteropError::Allocation(format!(
                "the allocator refused {len} bytes"
            )));
        }
        LIVE_ALLOCATIONS.with(|live| live.set(live.get() + 1));
        Ok(Self { ptr, len, ck_len })
    }

    /// Allocate a buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> InteropResult<Self> {
        let mut buffer = Self::allocate(bytes.len())?;
        buffer.write_bytes(0, bytes)?;
        Ok(buffer)
    }

    /// Allocate `size_of::<T>()` bytes holding the native representation of `value`.
    pub fn from_value<T: Copy>(value: &T) -> InteropResult<Self> {
        let mut buffer = Self::allocate(size_of::<T>())?;
        buffer.write_value(0, value)?;
        Ok(buffer)
    }

    fn layout(len: usize) -> InteropResult<Layout> {
        Layout::from_size_align(len, ALIGNMENT)
            .map_err(|e| InteropError::Allocation(format!("invalid layout for {len} bytes: {e}")))
    }

    fn check_bounds(&self, offset: usize, len: usize) -> InteropResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(InteropError::OutOfBounds {
                offset,
                len,
                capacity: self.len,
            }),
        }
    }

    /// Copy `bytes` into the buffer at `offset`.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> InteropResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.ptr.is_null() {
            return Err(InteropError::NullArgument(
                "cannot write into an empty buffer".to_owned(),
            ));
        }
        self.check_bounds(offset, bytes.len())?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
        Ok(())
    }

    /// Write the native representation of `value` at `offset`, unaligned.
    pub fn write_value<T: Copy>(&mut self, offset: usize, value: &T) -> InteropResult<()> {
        if size_of::<T>() == 0 {
            return Ok(());
        }
        if self.ptr.is_null() {
            return Err(InteropError::NullArgument(
                "cannot write into an empty buffer".to_owned(),
            ));
        }
        self.check_bounds(offset, size_of::<T>())?;
        unsafe {
            ptr::write_unaligned(self.ptr.add(offset).cast::<T>(), *value);
        }
        Ok(())
    }

    /// Copy `len` bytes starting at `offset` out of the buffer.
    pub fn read_bytes(&self, offset: usize, len: usize) -> InteropResult<Vec<u8>> {
        self.check_bounds(offset, len)?;
        Ok(self.as_slice()[offset..offset + len].to_vec())
    }

    /// Read a `T` at `offset`, unaligned.
    ///
    /// # Safety
    ///
    /// The bytes at `offset` must be a valid `T`: this holds for plain records
    /// made of integers, byte arrays and raw pointers, not for types with
    /// invalid bit patterns such as `bool` or non-optional function pointers.
    pub unsafe fn read_value<T: Copy>(&self, offset: usize) -> InteropResult<T> {
        self.check_bounds(offset, size_of::<T>())?;
        if size_of::<T>() == 0 {
            return Ok(unsafe { ptr::read_unaligned(ptr::NonNull::<T>::dangling().as_ptr()) });
        }
        Ok(unsafe { ptr::read_unaligned(self.ptr.add(offset).cast::<T>()) })
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            unsafe { slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            &mut []
        } else {
            unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
        }
    }

    /// The address handed to native code; null for an empty buffer.
    #[must_use]
    pub const fn as_mut_ptr(&self) -> CK_VOID_PTR {
        self.ptr.cast()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The length as the ABI expects it.
    #[must_use]
    pub const fn ck_len(&self) -> CK_ULONG {
        self.ck_len
    }

    /// A new allocation with the same content.
    pub fn try_clone(&self) -> InteropResult<Self> {
        Self::from_bytes(self.as_slice())
    }

    /// Release the memory now rather than at the end of the scope.
    pub fn free(self) {
        drop(self);
    }
}

impl Default for UnmanagedBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for UnmanagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnmanagedBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for UnmanagedBuffer {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        self.as_mut_slice().zeroize();
        // the layout was validated when the buffer was allocated
        if let Ok(layout) = Self::layout(self.len) {
            unsafe { alloc::dealloc(self.ptr, layout) };
        }
        self.ptr = ptr::null_mut();
        self.len = 0;
        self.ck_len = 0;
        LIVE_ALLOCATIONS.with(|live| live.set(live.get().saturating_sub(1)));
    }
}
