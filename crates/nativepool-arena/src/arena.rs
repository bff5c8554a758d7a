use core::{
  ptr::{
    self,
    NonNull,
  },
  slice,
  sync::atomic::{
    AtomicPtr,
    AtomicU64,
    AtomicUsize,
    Ordering,
    fence,
  },
};

use getset::{
  CopyGetters,
  Setters,
};
use nativepool_sys::math::align_up;
use spin::Mutex;

use crate::{
  ArenaError,
  ArenaResult,
  block::Block,
  config::{
    CACHE_LINE,
    MAX_ALIGNMENT,
    MAX_BLOCK_SIZE,
    MAX_BLOCKS,
    MAX_OFFSET,
    MIN_BLOCK_SIZE,
  },
};

/// A live span of arena memory. Not `Clone`: giving it back consumes it.
#[derive(Debug, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Rental {
  #[getset(skip)]
  arena: u64,
  block: usize,
  offset: usize,
  len: usize,
  version: u64,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A request normalized to the arena's cache-line granularity.
#[derive(Debug, Clone, Copy)]
struct Request {
  bytes: usize,
  size: usize,
  mask: usize,
}

impl Request {
  fn new(bytes: usize, align: usize) -> ArenaResult<Self> {
    if !align.is_power_of_two() || align > MAX_ALIGNMENT {
      return Err(ArenaError::InvalidAlignment);
    }
    if bytes as u64 > MAX_OFFSET {
      return Err(ArenaError::TooLarge);
    }

    let mut alignment = align.max(CACHE_LINE);
    let extra = alignment != CACHE_LINE;
    if extra {
      alignment = align_up(alignment, CACHE_LINE).ok_or(ArenaError::Overflow)?;
    }

    let mask = alignment - 1;
    let slack = if extra { alignment } else { 0 };
    let size = bytes
      .checked_add(slack)
      .and_then(|size| size.checked_add(mask))
      .ok_or(ArenaError::TooLarge)?
      & !mask;

    Ok(Self { bytes, size, mask })
  }
}

/// Concurrent bump allocator that frees everything at once.
///
/// Rentals bump through a list of up to [`MAX_BLOCKS`] blocks without
/// locking; only adding a block takes the lock. [`RewindableArena::rewind`]
/// keeps the blocks that saw use and releases the rest.
#[derive(Debug, CopyGetters, Setters)]
pub struct RewindableArena {
  blocks: [AtomicPtr<Block>; MAX_BLOCKS],
  last: AtomicUsize,
  /// Highest block index that has served a rental since the last rewind.
  used: AtomicUsize,
  lock: Mutex<()>,
  id: u64,
  #[getset(get_copy = "pub")]
  initial_capacity: usize,
  #[getset(get_copy = "pub")]
  version: u64,
  /// Whether [`RewindableArena::give_back`] does anything.
  #[getset(get_copy = "pub", set = "pub")]
  block_free: bool,
}

impl RewindableArena {
  pub fn new(initial_capacity: usize, block_free: bool) -> ArenaResult<Self> {
    let capacity = initial_capacity.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
    let first = Block::new(capacity)?;

    let blocks = [const { AtomicPtr::new(ptr::null_mut()) }; MAX_BLOCKS];
    blocks[0].store(first.as_ptr(), Ordering::Release);

    log::debug!("arena: created with a {} byte block", capacity);

    Ok(Self {
      blocks,
      last: AtomicUsize::new(0),
      used: AtomicUsize::new(0),
      lock: Mutex::new(()),
      id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
      initial_capacity: capacity,
      version: 0,
      block_free,
    })
  }

  #[inline]
  pub(crate) fn block(&self, index: usize) -> Option<&Block> {
    let ptr = self.blocks.get(index)?.load(Ordering::Acquire);
    unsafe { ptr.as_ref() }
  }

  pub fn blocks_allocated(&self) -> usize {
    self.last.load(Ordering::Acquire) + 1
  }

  pub fn try_rent(&self, size: usize) -> ArenaResult<Rental> {
    self.try_rent_aligned(size, CACHE_LINE)
  }

  pub fn try_rent_aligned(&self, size: usize, align: usize) -> ArenaResult<Rental> {
    let request = Request::new(size, align)?;

    let last = self.last.load(Ordering::Acquire);
    if let Some(rental) = self.try_blocks(0, last, request) {
      return Ok(rental);
    }

    let _guard = self.lock.lock();

    // Someone may have added a block while we waited.
    let current = self.last.load(Ordering::Acquire);
    if let Some(rental) = self.try_blocks(last, current, request) {
      return Ok(rental);
    }

    let index = current + 1;
    if index >= MAX_BLOCKS {
      return Err(ArenaError::OutOfBlocks);
    }

    let previous = self.block(current).map_or(MIN_BLOCK_SIZE, Block::capacity);
    let capacity = previous
      .saturating_mul(2)
      .min(MAX_BLOCK_SIZE)
      .max(request.size);
    let block = Block::new(capacity)?;

    self.blocks[index].store(block.as_ptr(), Ordering::Release);
    self.last.store(index, Ordering::Release);

    log::debug!("arena: added block {} with {} bytes", index, capacity);

    self
      .try_blocks(index, index, request)
      .ok_or(ArenaError::OutOfMemory)
  }

  fn try_blocks(&self, start: usize, end: usize, request: Request) -> Option<Rental> {
    for index in start..=end {
      let Some(block) = self.block(index) else {
        continue;
      };
      let Some(offset) = block.try_reserve(request.bytes, request.size, request.mask) else {
        continue;
      };

      fence(Ordering::SeqCst);
      self.used.fetch_max(index, Ordering::AcqRel);

      return Some(Rental {
        arena: self.id,
        block: index,
        offset,
        len: request.bytes,
        version: self.version,
      });
    }
    None
  }

  /// Hands a rental back. Without block free this only validates the
  /// rental's version; with it, the owning block's offset resets once its
  /// last rental comes back.
  pub fn give_back(&self, rental: Rental) -> ArenaResult<()> {
    let block = self.owning_block(&rental)?;
    if !self.block_free {
      return Ok(());
    }
    block.release(rental.offset, rental.len)
  }

  pub fn get<'a>(&'a self, rental: &'a Rental) -> Option<&'a [u8]> {
    let ptr = self.resolve(rental)?;
    Some(unsafe { slice::from_raw_parts(ptr.as_ptr(), rental.len) })
  }

  pub fn get_mut<'a>(&'a self, rental: &'a mut Rental) -> Option<&'a mut [u8]> {
    let ptr = self.resolve(rental)?;
    Some(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), rental.len) })
  }

  fn resolve(&self, rental: &Rental) -> Option<NonNull<u8>> {
    let block = self.owning_block(rental).ok()?;
    Some(unsafe { block.data().add(rental.offset) })
  }

  /// The block a rental was carved from, provided it came from this arena
  /// in the current version and lies within the block.
  fn owning_block(&self, rental: &Rental) -> ArenaResult<&Block> {
    if rental.arena != self.id {
      return Err(ArenaError::Foreign);
    }
    if rental.version != self.version {
      return Err(ArenaError::Stale);
    }
    let block = self.block(rental.block).ok_or(ArenaError::NotRented)?;
    let end = rental
      .offset
      .checked_add(rental.len)
      .ok_or(ArenaError::Overflow)?;
    if end > block.capacity() {
      return Err(ArenaError::NotRented);
    }
    Ok(block)
  }

  /// Invalidates every rental. Blocks up to the highest one used are kept
  /// and emptied; the rest are released.
  pub fn rewind(&mut self) {
    self.version += 1;

    let used = *self.used.get_mut();
    let last = *self.last.get_mut();
    for slot in self.blocks[used + 1..=last].iter_mut().rev() {
      let ptr = core::mem::replace(slot.get_mut(), ptr::null_mut());
      if let Some(block) = NonNull::new(ptr) {
        unsafe { Block::destroy(block) };
      }
    }

    for index in 0..=used {
      if let Some(block) = self.block(index) {
        block.rewind();
      }
    }

    *self.last.get_mut() = used;
    *self.used.get_mut() = 0;

    log::debug!(
      "arena: rewound to version {}, keeping {} blocks",
      self.version,
      used + 1
    );
  }

  /// Releases every block. Equivalent to dropping the arena.
  pub fn dispose(self) {
    drop(self);
  }
}

impl Drop for RewindableArena {
  fn drop(&mut self) {
    for slot in self.blocks.iter_mut() {
      let ptr = core::mem::replace(slot.get_mut(), ptr::null_mut());
      if let Some(block) = NonNull::new(ptr) {
        unsafe { Block::destroy(block) };
      }
    }
    log::debug!("arena: disposed");
  }
}
