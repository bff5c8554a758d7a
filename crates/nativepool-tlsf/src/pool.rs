use core::{
  ptr::NonNull,
  slice,
  sync::atomic::{
    AtomicU64,
    Ordering,
  },
};

use getset::CopyGetters;
use nativepool_sys::extent::{
  Extent,
  ExtentError,
};

use crate::{
  Pool,
  Tlsf,
  TlsfError,
  config::{
    BLOCK_HEADER_OVERHEAD,
    POOL_OVERHEAD,
  },
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PoolError {
  Extent(ExtentError),
  Tlsf(TlsfError),
  /// The rental predates the last [`DynamicPool::reset`].
  Stale,
  /// The rental was issued by another pool.
  Foreign,
  Overflow,
}

impl From<ExtentError> for PoolError {
  fn from(err: ExtentError) -> Self {
    PoolError::Extent(err)
  }
}

impl From<TlsfError> for PoolError {
  fn from(err: TlsfError) -> Self {
    PoolError::Tlsf(err)
  }
}

pub type PoolResult<T> = Result<T, PoolError>;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A live allocation in a [`DynamicPool`], addressed by offset.
#[derive(Debug, PartialEq, Eq, CopyGetters)]
pub struct Rental {
  /// Payload offset from the start of the pool's memory.
  #[getset(get_copy = "pub")]
  offset: usize,
  /// Bytes requested.
  #[getset(get_copy = "pub")]
  len: usize,
  /// Bytes usable, at least `len`.
  #[getset(get_copy = "pub")]
  capacity: usize,
  pool: u64,
  version: u64,
}

/// A TLSF allocator that owns its backing memory.
///
/// The extent is sized so that `blocks` allocations totalling `size` bytes
/// fit alongside their headers, though fragmentation may still refuse one.
#[derive(Debug, CopyGetters)]
pub struct DynamicPool {
  // Dropped before `extent`, which it points into.
  tlsf: Tlsf<'static>,
  pool: Pool<'static>,
  extent: Extent,
  id: u64,
  #[getset(get_copy = "pub")]
  size: usize,
  #[getset(get_copy = "pub")]
  blocks: usize,
  #[getset(get_copy = "pub")]
  version: u64,
}

impl DynamicPool {
  pub fn new(size: usize, blocks: usize) -> PoolResult<Self> {
    let bytes = blocks
      .checked_mul(BLOCK_HEADER_OVERHEAD)
      .and_then(|headers| headers.checked_add(size))
      .and_then(|bytes| bytes.checked_add(POOL_OVERHEAD))
      .ok_or(PoolError::Overflow)?;

    let mut extent = Extent::new(bytes)?;
    let (tlsf, pool) = Tlsf::with_pool(Self::region(&mut extent))?;

    log::debug!(
      "dynamic pool: {} bytes for {} blocks over a {} byte extent",
      size,
      blocks,
      extent.len()
    );

    Ok(Self {
      tlsf,
      pool,
      extent,
      id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
      size,
      blocks,
      version: 0,
    })
  }

  /// The whole extent as a `'static` region.
  fn region(extent: &mut Extent) -> &'static mut [u8] {
    // The mapping outlives the Tlsf that borrows it: both live in the same
    // DynamicPool and the Tlsf is dropped first.
    unsafe { slice::from_raw_parts_mut(extent.as_mut_ptr(), extent.len()) }
  }

  fn base(&self) -> NonNull<u8> {
    self.pool.start()
  }

  pub fn try_rent(&mut self, size: usize, align: usize) -> PoolResult<Rental> {
    let ptr = self.tlsf.memalign(align, size)?;
    let capacity = unsafe { Tlsf::block_size(ptr) };
    let offset = ptr.as_ptr() as usize - self.base().as_ptr() as usize;

    log::trace!("dynamic pool: rented {} bytes at offset {}", size, offset);

    Ok(Rental {
      offset,
      len: size,
      capacity,
      pool: self.id,
      version: self.version,
    })
  }

  pub fn give_back(&mut self, rental: Rental) -> PoolResult<()> {
    let ptr = self.resolve(&rental)?;
    // A live block still has the size it was rented with.
    if unsafe { Tlsf::block_size(ptr) } != rental.capacity {
      return Err(PoolError::Tlsf(TlsfError::NotAllocated));
    }
    unsafe { self.tlsf.free(ptr)? };
    Ok(())
  }

  fn resolve(&self, rental: &Rental) -> PoolResult<NonNull<u8>> {
    if rental.pool != self.id {
      return Err(PoolError::Foreign);
    }
    if rental.version != self.version {
      return Err(PoolError::Stale);
    }
    let end = rental
      .offset
      .checked_add(rental.capacity.max(rental.len))
      .ok_or(PoolError::Overflow)?;
    if rental.offset < BLOCK_HEADER_OVERHEAD {
      return Err(PoolError::Extent(ExtentError::OutOfBounds));
    }
    self.extent.check(rental.offset..end)?;
    Ok(unsafe { self.base().add(rental.offset) })
  }

  pub fn get(&self, rental: &Rental) -> Option<&[u8]> {
    let ptr = self.resolve(rental).ok()?;
    Some(unsafe { slice::from_raw_parts(ptr.as_ptr(), rental.len) })
  }

  pub fn get_mut(&mut self, rental: &mut Rental) -> Option<&mut [u8]> {
    let ptr = self.resolve(rental).ok()?;
    Some(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), rental.len) })
  }

  /// Drops every allocation at once and starts over on the same memory.
  pub fn reset(&mut self) -> PoolResult<()> {
    let (tlsf, pool) = Tlsf::with_pool(Self::region(&mut self.extent))?;
    self.tlsf = tlsf;
    self.pool = pool;
    self.version += 1;

    log::debug!("dynamic pool: reset to version {}", self.version);
    Ok(())
  }

  pub fn check(&self) -> PoolResult<()> {
    self.tlsf.check()?;
    Ok(())
  }

  /// Number of allocated blocks right now.
  pub fn rented(&self) -> usize {
    let mut count = 0;
    self.tlsf.walk_pool(&self.pool, |info| count += info.used as usize);
    count
  }
}
