//! Size-class geometry.
//!
//! Requests below [`SMALL_BLOCK_SIZE`] share first-level class 0 and are
//! split linearly into [`SL_INDEX_COUNT`] classes. Above it, each power of
//! two gets its own first-level class, subdivided into [`SL_INDEX_COUNT`]
//! linear second-level classes.

use core::mem::size_of;

const WORD: usize = size_of::<usize>();

pub const SL_INDEX_COUNT_LOG2: u32 = 5;

#[cfg(target_pointer_width = "64")]
pub const ALIGN_SIZE_LOG2: u32 = 3;
#[cfg(not(target_pointer_width = "64"))]
pub const ALIGN_SIZE_LOG2: u32 = 2;

#[cfg(target_pointer_width = "64")]
pub const FL_INDEX_MAX: u32 = 32;
#[cfg(not(target_pointer_width = "64"))]
pub const FL_INDEX_MAX: u32 = 30;

pub const ALIGN_SIZE: usize = 1 << ALIGN_SIZE_LOG2;
pub const SL_INDEX_COUNT: usize = 1 << SL_INDEX_COUNT_LOG2;
pub const FL_INDEX_SHIFT: u32 = SL_INDEX_COUNT_LOG2 + ALIGN_SIZE_LOG2;
pub const FL_INDEX_COUNT: usize = (FL_INDEX_MAX - FL_INDEX_SHIFT + 1) as usize;
pub const SMALL_BLOCK_SIZE: usize = 1 << FL_INDEX_SHIFT;

/// Bytes a used block spends on bookkeeping: its size word.
pub const BLOCK_HEADER_OVERHEAD: usize = WORD;

/// Full header footprint of a free block: predecessor link, size word and
/// the two free-list links.
pub const BLOCK_HEADER_SIZE: usize = 4 * WORD;

pub const BLOCK_SIZE_MIN: usize = BLOCK_HEADER_SIZE - WORD;
pub const BLOCK_SIZE_MAX: usize = 1 << FL_INDEX_MAX;

/// A pool loses one leading size word and one trailing sentinel block.
pub const POOL_OVERHEAD: usize = 2 * BLOCK_HEADER_OVERHEAD;

const _: () = assert!(FL_INDEX_COUNT <= u32::BITS as usize);
const _: () = assert!(SL_INDEX_COUNT <= u32::BITS as usize);
const _: () = assert!(ALIGN_SIZE == WORD);
