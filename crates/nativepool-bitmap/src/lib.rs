#![cfg_attr(not(test), no_std)]

//! Fixed 4096-slot index pools over a two-level bitmap.
//!
//! The outer word carries one bit per 64-slot segment and is set iff that
//! segment is full. Each inner word carries one bit per slot.

mod concurrent;
mod sequential;

pub use concurrent::ConcurrentIndexPool4096;
pub use sequential::IndexPool4096;


#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IndexError {
  OutOfRange { index: usize, size: usize },
  NotRented { index: usize },
}

pub type IndexResult<T> = Result<T, IndexError>;

pub type SegmentWord = u64;

const SEGMENT_BITS: usize = SegmentWord::BITS as usize;
const SEGMENT_SHIFT: usize = SEGMENT_BITS.trailing_zeros() as usize;
const SEGMENTS: usize = SEGMENT_BITS;
const FULL: SegmentWord = SegmentWord::MAX;

/// Number of slots in either pool.
pub const CAPACITY: usize = SEGMENTS * SEGMENT_BITS;

/// Splits an index into `(segment, bit)`.
const fn position(index: usize) -> IndexResult<(usize, u32)> {
  if index >= CAPACITY {
    return Err(IndexError::OutOfRange {
      index,
      size: CAPACITY,
    });
  }
  Ok((index >> SEGMENT_SHIFT, (index & (SEGMENT_BITS - 1)) as u32))
}

#[inline(always)]
const fn bit(n: u32) -> SegmentWord {
  1 << n
}

#[inline(always)]
const fn compose(segment: usize, offset: u32) -> usize {
  (segment << SEGMENT_SHIFT) | offset as usize
}
