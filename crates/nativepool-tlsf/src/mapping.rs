use nativepool_sys::{
  bitscan::fls,
  math::align_up,
};

use crate::config::{
  BLOCK_SIZE_MAX,
  BLOCK_SIZE_MIN,
  FL_INDEX_SHIFT,
  SL_INDEX_COUNT,
  SL_INDEX_COUNT_LOG2,
  SMALL_BLOCK_SIZE,
};

/// Size class `(fl, sl)` a free block of `size` bytes is filed under.
pub(crate) fn mapping_insert(size: usize) -> (usize, usize) {
  match fls(size) {
    Some(fl) if size >= SMALL_BLOCK_SIZE => {
      let sl = (size >> (fl - SL_INDEX_COUNT_LOG2)) ^ SL_INDEX_COUNT;
      ((fl - (FL_INDEX_SHIFT - 1)) as usize, sl)
    }
    _ => (0, size / (SMALL_BLOCK_SIZE / SL_INDEX_COUNT)),
  }
}

/// Like [`mapping_insert`], but rounds up to the next class boundary so any
/// block found in the returned class is large enough.
pub(crate) fn mapping_search(size: usize) -> (usize, usize) {
  let size = match fls(size) {
    Some(fl) if size >= SMALL_BLOCK_SIZE => {
      size.saturating_add((1 << (fl - SL_INDEX_COUNT_LOG2)) - 1)
    }
    _ => size,
  };
  mapping_insert(size)
}

/// Rounds a request to the allocator's granularity. `None` rejects zero
/// and anything at or past the largest block.
pub(crate) fn adjust_request_size(size: usize, align: usize) -> Option<usize> {
  if size == 0 {
    return None;
  }
  let aligned = align_up(size, align)?;
  if aligned >= BLOCK_SIZE_MAX {
    return None;
  }
  Some(aligned.max(BLOCK_SIZE_MIN))
}
