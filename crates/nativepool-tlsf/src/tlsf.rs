use core::{
  marker::PhantomData,
  ptr::{
    self,
    NonNull,
  },
};

use getset::CopyGetters;
use nativepool_sys::{
  bitscan::ffs32,
  math::{
    align_down,
    is_aligned,
  },
};

use crate::{
  TlsfError,
  TlsfResult,
  block::{
    Block,
    BlockInfo,
  },
  config::{
    ALIGN_SIZE,
    BLOCK_HEADER_OVERHEAD,
    BLOCK_HEADER_SIZE,
    BLOCK_SIZE_MAX,
    BLOCK_SIZE_MIN,
    FL_INDEX_COUNT,
    POOL_OVERHEAD,
    SL_INDEX_COUNT,
  },
  mapping::{
    adjust_request_size,
    mapping_insert,
    mapping_search,
  },
};

/// A region handed to [`Tlsf::add_pool`]. Not `Clone`: removing a pool
/// consumes its handle.
#[derive(Debug, CopyGetters)]
pub struct Pool<'pool> {
  /// First byte of the region, where the first block's size word lives.
  #[getset(get_copy = "pub")]
  start: NonNull<u8>,
  /// Bytes of the region under management, including overhead.
  #[getset(get_copy = "pub")]
  len: usize,
  _marker: PhantomData<&'pool mut [u8]>,
}

unsafe impl Send for Pool<'_> {}

/// Two-level segregated fit allocator over caller-provided regions.
///
/// Every operation is O(1): a request maps to a size class with two bit
/// scans, and freed blocks merge with free neighbours immediately.
#[derive(Debug)]
pub struct Tlsf<'pool> {
  fl_bitmap: u32,
  sl_bitmap: [u32; FL_INDEX_COUNT],
  blocks: [[Option<Block>; SL_INDEX_COUNT]; FL_INDEX_COUNT],
  _marker: PhantomData<&'pool mut [u8]>,
}

// Blocks are only reachable through `&mut self`.
unsafe impl Send for Tlsf<'_> {}

impl Default for Tlsf<'_> {
  fn default() -> Self {
    Self::new()
  }
}

impl<'pool> Tlsf<'pool> {
  pub const ALIGN_SIZE: usize = ALIGN_SIZE;
  pub const BLOCK_SIZE_MIN: usize = BLOCK_SIZE_MIN;
  pub const BLOCK_SIZE_MAX: usize = BLOCK_SIZE_MAX;
  pub const POOL_OVERHEAD: usize = POOL_OVERHEAD;
  pub const ALLOC_OVERHEAD: usize = BLOCK_HEADER_OVERHEAD;

  /// An allocator with no pools. Every request fails until one is added.
  pub const fn new() -> Self {
    Self {
      fl_bitmap: 0,
      sl_bitmap: [0; FL_INDEX_COUNT],
      blocks: [[None; SL_INDEX_COUNT]; FL_INDEX_COUNT],
      _marker: PhantomData,
    }
  }

  pub fn with_pool(region: &'pool mut [u8]) -> TlsfResult<(Self, Pool<'pool>)> {
    let mut tlsf = Self::new();
    let pool = tlsf.add_pool(region)?;
    Ok((tlsf, pool))
  }

  /// Places one free block spanning `region` followed by a zero-sized
  /// sentinel, and files the block.
  pub fn add_pool(&mut self, region: &'pool mut [u8]) -> TlsfResult<Pool<'pool>> {
    let start = region.as_mut_ptr();
    if is_aligned(start as usize, ALIGN_SIZE) != Some(true) {
      return Err(TlsfError::Misaligned);
    }

    let bytes = region
      .len()
      .checked_sub(POOL_OVERHEAD)
      .and_then(|bytes| align_down(bytes, ALIGN_SIZE))
      .ok_or(TlsfError::PoolSize)?;
    // A block of exactly `BLOCK_SIZE_MAX` maps past the last first-level class.
    if !(BLOCK_SIZE_MIN..BLOCK_SIZE_MAX).contains(&bytes) {
      return Err(TlsfError::PoolSize);
    }

    let start = NonNull::new(start).ok_or(TlsfError::Misaligned)?;
    unsafe {
      let block = Block::at(start);
      block.init(bytes, false);
      block.set_free(true);
      self.block_insert(block);

      let sentinel = block.link_next();
      sentinel.init(0, true);
    }

    log::debug!(
      "tlsf: added pool at {:p}, {} usable bytes",
      start.as_ptr(),
      bytes
    );

    Ok(Pool {
      start,
      len: region.len(),
      _marker: PhantomData,
    })
  }

  /// Whether any block carved from `pool` is still allocated.
  pub fn is_pool_in_use(&self, pool: &Pool<'pool>) -> bool {
    unsafe {
      let block = Block::at(pool.start);
      !block.is_free() || !block.next().is_last()
    }
  }

  /// Detaches a pool. Fails with [`TlsfError::PoolInUse`] while any block
  /// carved from it is still allocated, in which case the pool stays
  /// attached for the lifetime of the allocator. A pool added to another
  /// allocator fails with [`TlsfError::ForeignPool`].
  pub fn remove_pool(&mut self, pool: Pool<'pool>) -> TlsfResult<()> {
    if self.is_pool_in_use(&pool) {
      return Err(TlsfError::PoolInUse);
    }
    let block = unsafe { Block::at(pool.start) };
    if !self.is_listed(block) {
      return Err(TlsfError::ForeignPool);
    }
    unsafe { self.block_remove(block) };

    log::debug!("tlsf: removed pool at {:p}", pool.start.as_ptr());
    Ok(())
  }

  pub fn malloc(&mut self, size: usize) -> TlsfResult<NonNull<u8>> {
    let adjust = adjust_request_size(size, ALIGN_SIZE).ok_or(TlsfError::InvalidSize)?;
    let block = self.locate_free(adjust).ok_or(TlsfError::OutOfMemory)?;
    Ok(unsafe { self.prepare_used(block, adjust) })
  }

  /// Allocates `size` bytes at an address that is a multiple of `align`.
  pub fn memalign(&mut self, align: usize, size: usize) -> TlsfResult<NonNull<u8>> {
    if !align.is_power_of_two() {
      return Err(TlsfError::InvalidAlignment);
    }

    let adjust = adjust_request_size(size, ALIGN_SIZE).ok_or(TlsfError::InvalidSize)?;
    if align <= ALIGN_SIZE {
      let block = self.locate_free(adjust).ok_or(TlsfError::OutOfMemory)?;
      return Ok(unsafe { self.prepare_used(block, adjust) });
    }

    // Room for the payload, the worst-case alignment shift, and a leading
    // remainder big enough to stand as a free block of its own.
    let gap_minimum = BLOCK_HEADER_SIZE;
    let aligned_size = adjust
      .checked_add(align)
      .and_then(|size| size.checked_add(gap_minimum))
      .and_then(|size| adjust_request_size(size, align))
      .ok_or(TlsfError::InvalidSize)?;

    let mut block = self.locate_free(aligned_size).ok_or(TlsfError::OutOfMemory)?;

    unsafe {
      let ptr = block.payload().as_ptr() as usize;
      let mut aligned = ptr.next_multiple_of(align);
      let mut gap = aligned - ptr;

      if gap != 0 && gap < gap_minimum {
        let gap_remain = gap_minimum - gap;
        let offset = gap_remain.max(align);
        aligned = (aligned + offset).next_multiple_of(align);
        gap = aligned - ptr;
      }

      if gap != 0 {
        block = self.trim_free_leading(block, gap);
      }
      debug_assert_eq!(block.payload().as_ptr() as usize % align, 0);

      Ok(self.prepare_used(block, adjust))
    }
  }

  /// Returns a block to its free list, merging with free neighbours.
  ///
  /// # Safety
  /// `ptr` must have come from this allocator and must not be used after.
  pub unsafe fn free(&mut self, ptr: NonNull<u8>) -> TlsfResult<()> {
    unsafe {
      let block = Block::from_payload(ptr);
      if block.is_free() {
        return Err(TlsfError::NotAllocated);
      }
      block.mark_as_free();
      let block = self.merge_prev(block);
      let block = self.merge_next(block);
      self.block_insert(block);
    }
    Ok(())
  }

  /// Resizes a block, in place when the physical successor is free and big
  /// enough, otherwise by allocate-copy-free.
  ///
  /// `None` in behaves like [`Tlsf::malloc`]; a zero size frees and yields
  /// `None`. On failure the block is left untouched.
  ///
  /// # Safety
  /// A `Some` pointer must be live and from this allocator.
  pub unsafe fn realloc(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> TlsfResult<Option<NonNull<u8>>> {
    let Some(ptr) = ptr else {
      return self.malloc(size).map(Some);
    };
    if size == 0 {
      unsafe { self.free(ptr)? };
      return Ok(None);
    }

    unsafe {
      let block = Block::from_payload(ptr);
      if block.is_free() {
        return Err(TlsfError::NotAllocated);
      }

      let next = block.next();
      let cursize = block.size();
      let combined = cursize + next.size() + BLOCK_HEADER_OVERHEAD;
      let adjust = adjust_request_size(size, ALIGN_SIZE).ok_or(TlsfError::InvalidSize)?;

      if adjust > cursize && (!next.is_free() || adjust > combined) {
        let moved = self.malloc(size)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), cursize.min(size));
        self.free(ptr)?;
        return Ok(Some(moved));
      }

      if adjust > cursize {
        self.merge_next(block);
        block.mark_as_used();
      }
      self.trim_used(block, adjust);
      Ok(Some(ptr))
    }
  }

  /// Usable bytes behind an allocated pointer.
  ///
  /// # Safety
  /// `ptr` must be live and from a [`Tlsf`].
  pub unsafe fn block_size(ptr: NonNull<u8>) -> usize {
    unsafe { Block::from_payload(ptr).size() }
  }

  /// Visits every block of `pool` in address order.
  pub fn walk_pool(&self, pool: &Pool<'pool>, mut visit: impl FnMut(BlockInfo)) {
    unsafe {
      let mut block = Block::at(pool.start);
      while !block.is_last() {
        visit(BlockInfo {
          ptr: block.payload(),
          size: block.size(),
          used: !block.is_free(),
        });
        block = block.next();
      }
    }
  }

  /// Verifies bitmap and free-list consistency.
  pub fn check(&self) -> TlsfResult<()> {
    for fl in 0..FL_INDEX_COUNT {
      let sl_map = self.sl_bitmap[fl];
      let fl_set = self.fl_bitmap & (1 << fl) != 0;
      if fl_set != (sl_map != 0) {
        return Err(TlsfError::Corrupted { fl, sl: 0 });
      }

      for sl in 0..SL_INDEX_COUNT {
        let corrupted = TlsfError::Corrupted { fl, sl };
        let head = self.blocks[fl][sl];
        if (sl_map & (1 << sl) != 0) != head.is_some() {
          return Err(corrupted);
        }

        let mut previous = None;
        let mut cursor = head;
        while let Some(block) = cursor {
          unsafe {
            let next = block.next();
            let sound = block.is_free()
              && block.prev_free() == previous
              && !block.is_prev_free()
              && !next.is_free()
              && next.is_prev_free()
              && block.size() >= BLOCK_SIZE_MIN
              && mapping_insert(block.size()) == (fl, sl);
            if !sound {
              return Err(corrupted);
            }
            previous = cursor;
            cursor = block.next_free();
          }
        }
      }
    }
    Ok(())
  }

  /// Whether `block` sits on one of this allocator's free lists.
  fn is_listed(&self, block: Block) -> bool {
    let (fl, sl) = mapping_insert(unsafe { block.size() });
    let Some(mut cursor) = self.blocks.get(fl).and_then(|lists| lists.get(sl).copied().flatten()) else {
      return false;
    };
    loop {
      if cursor == block {
        return true;
      }
      match unsafe { cursor.next_free() } {
        Some(next) => cursor = next,
        None => return false,
      }
    }
  }

  fn locate_free(&mut self, size: usize) -> Option<Block> {
    let (fl, sl) = mapping_search(size);
    if fl >= FL_INDEX_COUNT {
      return None;
    }
    let (fl, sl) = self.search_suitable_block(fl, sl)?;
    let block = self.blocks[fl][sl]?;
    unsafe { self.remove_free_block(block, fl, sl) };
    Some(block)
  }

  fn search_suitable_block(&self, fl: usize, sl: usize) -> Option<(usize, usize)> {
    let mut fl = fl;
    let mut sl_map = self.sl_bitmap[fl] & (u32::MAX << sl);
    if sl_map == 0 {
      let fl_map = self.fl_bitmap & u32::MAX.checked_shl(fl as u32 + 1).unwrap_or(0);
      fl = ffs32(fl_map)? as usize;
      sl_map = self.sl_bitmap[fl];
    }
    let sl = ffs32(sl_map)? as usize;
    Some((fl, sl))
  }

  unsafe fn remove_free_block(&mut self, block: Block, fl: usize, sl: usize) {
    unsafe {
      let prev = block.prev_free();
      let next = block.next_free();
      if let Some(next) = next {
        next.set_prev_free_link(prev);
      }
      if let Some(prev) = prev {
        prev.set_next_free(next);
      }

      if self.blocks[fl][sl] == Some(block) {
        self.blocks[fl][sl] = next;
        if next.is_none() {
          self.sl_bitmap[fl] &= !(1 << sl);
          if self.sl_bitmap[fl] == 0 {
            self.fl_bitmap &= !(1 << fl);
          }
        }
      }
    }
  }

  unsafe fn insert_free_block(&mut self, block: Block, fl: usize, sl: usize) {
    unsafe {
      let head = self.blocks[fl][sl];
      block.set_next_free(head);
      block.set_prev_free_link(None);
      if let Some(head) = head {
        head.set_prev_free_link(Some(block));
      }
    }
    self.blocks[fl][sl] = Some(block);
    self.fl_bitmap |= 1 << fl;
    self.sl_bitmap[fl] |= 1 << sl;
  }

  unsafe fn block_remove(&mut self, block: Block) {
    let (fl, sl) = mapping_insert(unsafe { block.size() });
    unsafe { self.remove_free_block(block, fl, sl) }
  }

  unsafe fn block_insert(&mut self, block: Block) {
    let (fl, sl) = mapping_insert(unsafe { block.size() });
    unsafe { self.insert_free_block(block, fl, sl) }
  }

  unsafe fn merge_prev(&mut self, block: Block) -> Block {
    unsafe {
      if !block.is_prev_free() {
        return block;
      }
      let prev = block.prev();
      self.block_remove(prev);
      prev.absorb(block);
      prev
    }
  }

  unsafe fn merge_next(&mut self, block: Block) -> Block {
    unsafe {
      let next = block.next();
      if next.is_free() {
        self.block_remove(next);
        block.absorb(next);
      }
      block
    }
  }

  /// Returns the tail of a free block past `size` to the free lists.
  unsafe fn trim_free(&mut self, block: Block, size: usize) {
    unsafe {
      if block.can_split(size) {
        let remaining = block.split(size);
        block.link_next();
        remaining.set_prev_free(true);
        self.block_insert(remaining);
      }
    }
  }

  /// Returns the tail of a used block past `size`, merging it forward.
  unsafe fn trim_used(&mut self, block: Block, size: usize) {
    unsafe {
      if block.can_split(size) {
        let remaining = block.split(size);
        remaining.set_prev_free(false);
        let remaining = self.merge_next(remaining);
        self.block_insert(remaining);
      }
    }
  }

  /// Splits `size` bytes off the front of a free block and files them,
  /// returning the tail.
  unsafe fn trim_free_leading(&mut self, block: Block, size: usize) -> Block {
    unsafe {
      if !block.can_split(size) {
        return block;
      }
      let remaining = block.split(size - BLOCK_HEADER_OVERHEAD);
      remaining.set_prev_free(true);
      block.link_next();
      self.block_insert(block);
      remaining
    }
  }

  unsafe fn prepare_used(&mut self, block: Block, size: usize) -> NonNull<u8> {
    unsafe {
      self.trim_free(block, size);
      block.mark_as_used();
    }
    block.payload()
  }
}
