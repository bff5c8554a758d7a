use core::{
  mem::{
    ManuallyDrop,
    size_of,
  },
  ptr::{
    self,
    NonNull,
  },
  sync::atomic::{
    AtomicU64,
    Ordering,
  },
};

use nativepool_sys::{
  extent::Extent,
  math::align_up,
};

use crate::{
  ArenaError,
  ArenaResult,
  config::{
    MAX_ALIGNMENT,
    MAX_COUNT,
    MAX_OFFSET,
    OFFSET_BITS,
  },
};

/// Bump offset and live-rental count, packed so both move in one CAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct State(u64);

impl State {
  pub const EMPTY: Self = Self(0);

  #[inline]
  pub const fn new(offset: u64, count: u64) -> Self {
    Self((offset & MAX_OFFSET) | ((count & MAX_COUNT) << OFFSET_BITS))
  }

  #[inline]
  pub const fn offset(self) -> u64 {
    self.0 & MAX_OFFSET
  }

  #[inline]
  pub const fn count(self) -> u64 {
    (self.0 >> OFFSET_BITS) & MAX_COUNT
  }
}

/// One contiguous arena block. The header lives at the front of its own
/// extent; data starts at the next [`MAX_ALIGNMENT`] boundary after it.
pub(crate) struct Block {
  state: AtomicU64,
  capacity: usize,
  data: NonNull<u8>,
  extent: ManuallyDrop<Extent>,
}

impl Block {
  pub fn new(capacity: usize) -> ArenaResult<NonNull<Self>> {
    let bytes = size_of::<Self>()
      .checked_add(MAX_ALIGNMENT - 1)
      .and_then(|bytes| bytes.checked_add(capacity))
      .ok_or(ArenaError::Overflow)?;

    let mut extent = Extent::new(bytes).map_err(ArenaError::Extent)?;
    let base = extent.as_mut_ptr();
    let start = base as usize;
    let data_offset = align_up(start + size_of::<Self>(), MAX_ALIGNMENT)
      .map(|data| data - start)
      .ok_or(ArenaError::Overflow)?;

    let header = base.cast::<Self>();
    unsafe {
      header.write(Self {
        state: AtomicU64::new(State::EMPTY.0),
        capacity,
        data: NonNull::new_unchecked(base.add(data_offset)),
        extent: ManuallyDrop::new(extent),
      });
      Ok(NonNull::new_unchecked(header))
    }
  }

  /// Unmaps the block, header included.
  ///
  /// # Safety
  /// `block` must come from [`Block::new`] and must not be used again.
  pub unsafe fn destroy(block: NonNull<Self>) {
    let extent = unsafe { ptr::addr_of!((*block.as_ptr()).extent).read() };
    drop(ManuallyDrop::into_inner(extent));
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  #[inline]
  pub fn data(&self) -> NonNull<u8> {
    self.data
  }

  #[inline]
  pub fn state(&self) -> State {
    State(self.state.load(Ordering::Acquire))
  }

  /// Bumps past `size` bytes starting at the next `mask`-aligned offset
  /// that still leaves room for `bytes`. Returns that starting offset.
  pub fn try_reserve(&self, bytes: usize, size: usize, mask: usize) -> Option<usize> {
    let mut current = self.state();
    loop {
      if current.count() == MAX_COUNT {
        return None;
      }

      let begin = (current.offset() as usize).checked_add(mask)? & !mask;
      if begin.checked_add(bytes)? > self.capacity {
        return None;
      }

      let end = begin.saturating_add(size).min(self.capacity);
      let next = State::new(end as u64, current.count() + 1);
      match self.state.compare_exchange_weak(
        current.0,
        next.0,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return Some(begin),
        Err(actual) => current = State(actual),
      }
    }
  }

  /// Drops one live rental covering `offset..offset + len`. The bump offset
  /// falls back to zero with the last one.
  pub fn release(&self, offset: usize, len: usize) -> ArenaResult<()> {
    let end = offset.checked_add(len).ok_or(ArenaError::NotRented)?;
    let mut current = self.state();
    loop {
      if current.count() == 0 || end as u64 > current.offset() {
        return Err(ArenaError::NotRented);
      }

      let next = match current.count() {
        1 => State::EMPTY,
        count => State::new(current.offset(), count - 1),
      };
      match self.state.compare_exchange_weak(
        current.0,
        next.0,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return Ok(()),
        Err(actual) => current = State(actual),
      }
    }
  }

  #[inline]
  pub fn rewind(&self) {
    self.state.store(State::EMPTY.0, Ordering::Release);
  }
}
