use nativepool_sys::bitscan::ffc64;

use crate::{
  CAPACITY,
  FULL,
  IndexError,
  IndexResult,
  SEGMENTS,
  SegmentWord,
  bit,
  compose,
  position,
};

/// Single-threaded index pool. Callers serialize access through `&mut self`.
#[derive(Debug, Clone)]
pub struct IndexPool4096 {
  summary: SegmentWord,
  segments: [SegmentWord; SEGMENTS],
}

impl Default for IndexPool4096 {
  fn default() -> Self {
    Self::new()
  }
}

impl IndexPool4096 {
  pub const CAPACITY: usize = CAPACITY;

  pub const fn new() -> Self {
    Self {
      summary: 0,
      segments: [0; SEGMENTS],
    }
  }

  /// Claims the lowest free slot, or `None` when all 4096 are rented.
  pub fn try_rent(&mut self) -> Option<usize> {
    let quotient = ffc64(self.summary)? as usize;
    let segment = &mut self.segments[quotient];
    // A clear summary bit means this segment has room.
    let remainder = ffc64(*segment)?;

    *segment |= bit(remainder);
    if *segment == FULL {
      self.summary |= bit(quotient as u32);
    }

    Some(compose(quotient, remainder))
  }

  pub fn give_back(&mut self, index: usize) -> IndexResult<()> {
    let (quotient, remainder) = position(index)?;
    let segment = &mut self.segments[quotient];
    let mask = bit(remainder);

    if *segment & mask == 0 {
      return Err(IndexError::NotRented { index });
    }

    let was_full = *segment == FULL;
    *segment &= !mask;
    if was_full {
      self.summary &= !bit(quotient as u32);
    }

    Ok(())
  }

  pub fn is_rented(&self, index: usize) -> IndexResult<bool> {
    let (quotient, remainder) = position(index)?;
    Ok(self.segments[quotient] & bit(remainder) != 0)
  }

  pub fn len(&self) -> usize {
    self
      .segments
      .iter()
      .map(|segment| segment.count_ones() as usize)
      .sum()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.segments.iter().all(|&segment| segment == 0)
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.summary == FULL
  }
}
