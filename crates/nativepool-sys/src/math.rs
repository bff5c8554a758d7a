pub const fn is_aligned(value: usize, align: usize) -> Option<bool> {
  if !align.is_power_of_two() {
    return None;
  }
  Some((value & (align - 1)) == 0)
}

pub const fn align_up(value: usize, align: usize) -> Option<usize> {
  if !align.is_power_of_two() {
    return None;
  }

  let mask = align - 1;
  match value.checked_add(mask) {
    Some(sum) => Some(sum & !mask),
    None => None,
  }
}

pub const fn align_down(value: usize, align: usize) -> Option<usize> {
  if !align.is_power_of_two() {
    return None;
  }

  Some(value & !(align - 1))
}

/// Distance from `addr` to the next multiple of `align`.
pub const fn align_offset(addr: usize, align: usize) -> Option<usize> {
  match align_up(addr, align) {
    Some(aligned) => Some(aligned - addr),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_aligned() {
    assert_eq!(is_aligned(0, 8), Some(true));
    assert_eq!(is_aligned(8, 8), Some(true));
    assert_eq!(is_aligned(12, 8), Some(false));
    assert_eq!(is_aligned(16384, 16384), Some(true));
    assert_eq!(is_aligned(128, 256), Some(false));
    assert_eq!(is_aligned(100, 3), None);
  }

  #[test]
  fn test_align_up() {
    assert_eq!(align_up(0, 8), Some(0));
    assert_eq!(align_up(1, 8), Some(8));
    assert_eq!(align_up(8, 8), Some(8));
    assert_eq!(align_up(9, 8), Some(16));
    assert_eq!(align_up(129, 128), Some(256));
    assert_eq!(align_up(100, 6), None);
    assert_eq!(align_up(usize::MAX - 6, 8), None);
  }

  #[test]
  fn test_align_down() {
    assert_eq!(align_down(7, 8), Some(0));
    assert_eq!(align_down(15, 8), Some(8));
    assert_eq!(align_down(300, 128), Some(256));
    assert_eq!(align_down(100, 3), None);
  }

  #[test]
  fn test_align_offset() {
    assert_eq!(align_offset(0, 16), Some(0));
    assert_eq!(align_offset(1, 16), Some(15));
    assert_eq!(align_offset(24, 16), Some(8));
    assert_eq!(align_offset(usize::MAX, 8), None);
  }
}
