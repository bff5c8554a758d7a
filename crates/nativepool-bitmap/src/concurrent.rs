use core::sync::atomic::{
  AtomicU64,
  Ordering,
};

use nativepool_sys::bitscan::ffc64;

use crate::{
  CAPACITY,
  FULL,
  IndexError,
  IndexResult,
  SEGMENTS,
  bit,
  compose,
  position,
};

/// Lock-free index pool.
///
/// Every read-modify-write on a segment is a compare-and-swap. A failed
/// claim restarts from the summary word, since a segment that looked full or
/// free may have changed under a concurrent rent or return.
#[derive(Debug)]
pub struct ConcurrentIndexPool4096 {
  pub(crate) summary: AtomicU64,
  segments: [AtomicU64; SEGMENTS],
}

impl Default for ConcurrentIndexPool4096 {
  fn default() -> Self {
    Self::new()
  }
}

impl ConcurrentIndexPool4096 {
  pub const CAPACITY: usize = CAPACITY;

  pub const fn new() -> Self {
    Self {
      summary: AtomicU64::new(0),
      segments: [const { AtomicU64::new(0) }; SEGMENTS],
    }
  }

  pub fn try_rent(&self) -> Option<usize> {
    loop {
      let summary = self.summary.load(Ordering::Acquire);
      let Some(quotient) = ffc64(summary) else {
        // `mark_full` may hold a bit for a segment that has since reopened.
        let open = self.segments.iter().position(|segment| {
          segment.load(Ordering::Acquire) != FULL
        })?;
        self.summary.fetch_and(!bit(open as u32), Ordering::AcqRel);
        continue;
      };
      let quotient = quotient as usize;
      let segment = &self.segments[quotient];

      let current = segment.load(Ordering::Acquire);
      let Some(remainder) = ffc64(current) else {
        // The filler has not published the summary bit yet.
        self.mark_full(quotient);
        continue;
      };

      let claimed = current | bit(remainder);
      if segment
        .compare_exchange_weak(current, claimed, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
      {
        continue;
      }

      if claimed == FULL {
        self.mark_full(quotient);
      }

      return Some(compose(quotient, remainder));
    }
  }

  pub fn give_back(&self, index: usize) -> IndexResult<()> {
    let (quotient, remainder) = position(index)?;
    let mask = bit(remainder);

    let previous = self.segments[quotient].fetch_and(!mask, Ordering::AcqRel);
    if previous & mask == 0 {
      return Err(IndexError::NotRented { index });
    }

    if previous == FULL {
      self.summary.fetch_and(!bit(quotient as u32), Ordering::AcqRel);
    }

    Ok(())
  }

  /// Sets the summary bit for a segment that was observed full, then backs it
  /// out again if a return slipped in before the bit landed.
  fn mark_full(&self, quotient: usize) {
    let mask = bit(quotient as u32);
    self.summary.fetch_or(mask, Ordering::AcqRel);
    if self.segments[quotient].load(Ordering::Acquire) != FULL {
      self.summary.fetch_and(!mask, Ordering::AcqRel);
    }
  }

  pub fn is_rented(&self, index: usize) -> IndexResult<bool> {
    let (quotient, remainder) = position(index)?;
    Ok(self.segments[quotient].load(Ordering::Acquire) & bit(remainder) != 0)
  }

  /// Number of rented slots. Only a snapshot under concurrent traffic.
  pub fn len(&self) -> usize {
    self
      .segments
      .iter()
      .map(|segment| segment.load(Ordering::Relaxed).count_ones() as usize)
      .sum()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.summary.load(Ordering::Acquire) == FULL
  }
}
