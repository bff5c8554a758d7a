//! In-band block headers. All accessors are unsafe: they dereference the
//! block's words.
//!
//! A [`Block`] points at a block's size word. The word before it is the
//! physical-predecessor link, which lives in the predecessor's payload and
//! is only meaningful while the predecessor is free. The payload starts one
//! word after the size word; a free block reuses its first two payload words
//! as the free-list links.
//!
//! ```text
//!   ptr - W : prev_phys (owned by previous block)
//!   ptr     : size | PREV_FREE | FREE
//!   ptr + W : payload / next_free
//!   ptr + 2W: prev_free
//! ```

use core::ptr::{
  self,
  NonNull,
};

use crate::config::{
  BLOCK_HEADER_OVERHEAD,
  BLOCK_HEADER_SIZE,
};

const FREE_BIT: usize = 1 << 0;
const PREV_FREE_BIT: usize = 1 << 1;
const FLAG_MASK: usize = FREE_BIT | PREV_FREE_BIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block(NonNull<usize>);

impl Block {
  /// # Safety
  /// `ptr` must be word-aligned and point at a size word inside a pool.
  #[inline(always)]
  pub unsafe fn at(ptr: NonNull<u8>) -> Self {
    Self(ptr.cast())
  }

  /// # Safety
  /// `ptr` must be a payload pointer handed out by the allocator.
  #[inline(always)]
  pub unsafe fn from_payload(ptr: NonNull<u8>) -> Self {
    Self(unsafe { ptr.cast::<usize>().sub(1) })
  }

  #[inline(always)]
  pub fn payload(self) -> NonNull<u8> {
    unsafe { self.0.add(1) }.cast()
  }

  #[inline(always)]
  fn link(self, offset: isize) -> *mut *mut usize {
    self.0.as_ptr().wrapping_offset(offset).cast()
  }

  #[inline(always)]
  unsafe fn word(self) -> usize {
    unsafe { *self.0.as_ptr() }
  }

  #[inline(always)]
  unsafe fn set_word(self, word: usize) {
    unsafe { *self.0.as_ptr() = word }
  }

  /// Writes a fresh size word, discarding any previous flags.
  #[inline]
  pub unsafe fn init(self, size: usize, prev_free: bool) {
    let flags = if prev_free { PREV_FREE_BIT } else { 0 };
    unsafe { self.set_word(size | flags) }
  }

  #[inline]
  pub unsafe fn size(self) -> usize {
    unsafe { self.word() & !FLAG_MASK }
  }

  #[inline]
  pub unsafe fn set_size(self, size: usize) {
    unsafe { self.set_word(size | (self.word() & FLAG_MASK)) }
  }

  /// The zero-sized sentinel closing every pool.
  #[inline]
  pub unsafe fn is_last(self) -> bool {
    unsafe { self.size() == 0 }
  }

  #[inline]
  pub unsafe fn is_free(self) -> bool {
    unsafe { self.word() & FREE_BIT != 0 }
  }

  #[inline]
  unsafe fn set_flag(self, flag: usize, on: bool) {
    unsafe {
      let word = self.word();
      self.set_word(if on { word | flag } else { word & !flag });
    }
  }

  #[inline]
  pub unsafe fn set_free(self, free: bool) {
    unsafe { self.set_flag(FREE_BIT, free) }
  }

  #[inline]
  pub unsafe fn is_prev_free(self) -> bool {
    unsafe { self.word() & PREV_FREE_BIT != 0 }
  }

  #[inline]
  pub unsafe fn set_prev_free(self, free: bool) {
    unsafe { self.set_flag(PREV_FREE_BIT, free) }
  }

  /// Physical predecessor. Only valid when [`Block::is_prev_free`] holds.
  #[inline]
  pub unsafe fn prev(self) -> Block {
    unsafe { Block(NonNull::new_unchecked(*self.link(-1))) }
  }

  #[inline]
  pub unsafe fn next(self) -> Block {
    unsafe {
      Block(self.payload().add(self.size()).cast())
    }
  }

  /// Returns the physical successor after pointing its predecessor link here.
  #[inline]
  pub unsafe fn link_next(self) -> Block {
    unsafe {
      let next = self.next();
      *next.link(-1) = self.0.as_ptr();
      next
    }
  }

  pub unsafe fn mark_as_free(self) {
    unsafe {
      let next = self.link_next();
      next.set_prev_free(true);
      self.set_free(true);
    }
  }

  pub unsafe fn mark_as_used(self) {
    unsafe {
      self.next().set_prev_free(false);
      self.set_free(false);
    }
  }

  #[inline]
  pub unsafe fn next_free(self) -> Option<Block> {
    unsafe { NonNull::new(*self.link(1)).map(Block) }
  }

  #[inline]
  pub unsafe fn prev_free(self) -> Option<Block> {
    unsafe { NonNull::new(*self.link(2)).map(Block) }
  }

  #[inline]
  pub unsafe fn set_next_free(self, block: Option<Block>) {
    unsafe { *self.link(1) = block.map_or(ptr::null_mut(), |b| b.0.as_ptr()) }
  }

  #[inline]
  pub unsafe fn set_prev_free_link(self, block: Option<Block>) {
    unsafe { *self.link(2) = block.map_or(ptr::null_mut(), |b| b.0.as_ptr()) }
  }

  #[inline]
  pub unsafe fn can_split(self, size: usize) -> bool {
    unsafe { self.size() >= BLOCK_HEADER_SIZE + size }
  }

  /// Carves `size` payload bytes off the front. The remainder is returned
  /// marked free and linked to its successor.
  pub unsafe fn split(self, size: usize) -> Block {
    unsafe {
      let remaining = Block(self.payload().add(size).cast::<usize>());
      let remain_size = self.size() - (size + BLOCK_HEADER_OVERHEAD);
      remaining.init(remain_size, false);
      self.set_size(size);
      remaining.mark_as_free();
      remaining
    }
  }

  /// Folds the physical successor `next` into this block.
  pub unsafe fn absorb(self, next: Block) {
    unsafe {
      self.set_size(self.size() + next.size() + BLOCK_HEADER_OVERHEAD);
      self.link_next();
    }
  }
}

/// What a pool walk reports for each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub ptr: NonNull<u8>,
  pub size: usize,
  pub used: bool,
}
