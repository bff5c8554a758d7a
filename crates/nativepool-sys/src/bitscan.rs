//! Find-first-set / find-last-set over machine words.
//!
//! Both return `None` for a zero word. Callers in the size-class and bitmap
//! code only scan words they have already checked to be nonzero, but the
//! guard keeps a zero input from turning into an out-of-range index.

/// Index of the most significant set bit.
#[inline(always)]
pub const fn fls(word: usize) -> Option<u32> {
  if word == 0 {
    return None;
  }
  Some(usize::BITS - 1 - word.leading_zeros())
}

/// Index of the least significant set bit.
#[inline(always)]
pub const fn ffs(word: usize) -> Option<u32> {
  if word == 0 {
    return None;
  }
  Some(word.trailing_zeros())
}

/// Index of the least significant set bit of a 32-bit bitmap.
#[inline(always)]
pub const fn ffs32(word: u32) -> Option<u32> {
  if word == 0 {
    return None;
  }
  Some(word.trailing_zeros())
}

/// Index of the least significant clear bit of a 64-bit bitmap.
#[inline(always)]
pub const fn ffc64(word: u64) -> Option<u32> {
  let inverted = !word;
  if inverted == 0 {
    return None;
  }
  Some(inverted.trailing_zeros())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_input_is_guarded() {
    assert_eq!(fls(0), None);
    assert_eq!(ffs(0), None);
    assert_eq!(ffs32(0), None);
    assert_eq!(ffc64(u64::MAX), None);
  }

  #[test]
  fn test_fls() {
    assert_eq!(fls(1), Some(0));
    assert_eq!(fls(2), Some(1));
    assert_eq!(fls(3), Some(1));
    assert_eq!(fls(256), Some(8));
    assert_eq!(fls(511), Some(8));
    assert_eq!(fls(usize::MAX), Some(usize::BITS - 1));
  }

  #[test]
  fn test_ffs() {
    assert_eq!(ffs(1), Some(0));
    assert_eq!(ffs(0b1000), Some(3));
    assert_eq!(ffs(0b1010_0000), Some(5));
    assert_eq!(ffs(usize::MAX), Some(0));
    assert_eq!(ffs32(0x8000_0000), Some(31));
    assert_eq!(ffs32(0b110), Some(1));
  }

  #[test]
  fn test_ffc64() {
    assert_eq!(ffc64(0), Some(0));
    assert_eq!(ffc64(0b0111), Some(3));
    assert_eq!(ffc64(u64::MAX >> 1), Some(63));
  }
}
