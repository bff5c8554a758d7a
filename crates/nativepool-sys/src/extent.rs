use core::ops::Range;

use crate::{
  GLOBAL_SYSTEM,
  prim::{
    PrimError,
    page_align,
  },
  system::SysError,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExtentError {
  SystemError(SysError),
  PrimError(PrimError),
  OutOfBounds,
}

pub type ExtentResult<T> = Result<T, ExtentError>;

/// A page-granular region of backing memory, returned to the system on drop.
pub struct Extent {
  slice: &'static mut [u8],
}

impl core::fmt::Debug for Extent {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Extent")
      .field("ptr", &self.slice.as_ptr())
      .field("len", &self.slice.len())
      .finish()
  }
}

impl Extent {
  /// Maps at least `size` bytes, rounded up to whole pages.
  pub fn new(size: usize) -> ExtentResult<Extent> {
    let size = page_align(size).map_err(ExtentError::PrimError)?;
    let slice = unsafe { GLOBAL_SYSTEM.alloc(size) }.map_err(ExtentError::SystemError)?;

    Ok(Extent { slice })
  }

  pub fn check(&self, range: Range<usize>) -> ExtentResult<()> {
    if range.start > range.end || range.end > self.slice.len() {
      return Err(ExtentError::OutOfBounds);
    }
    Ok(())
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.slice.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.slice.is_empty()
  }

  #[inline(always)]
  pub fn as_ptr(&self) -> *const u8 {
    self.slice.as_ptr()
  }

  #[inline(always)]
  pub fn as_mut_ptr(&mut self) -> *mut u8 {
    self.slice.as_mut_ptr()
  }
}

impl AsRef<[u8]> for Extent {
  fn as_ref(&self) -> &[u8] {
    self.slice
  }
}

impl AsMut<[u8]> for Extent {
  fn as_mut(&mut self) -> &mut [u8] {
    self.slice
  }
}

impl Drop for Extent {
  fn drop(&mut self) {
    let _ = unsafe { GLOBAL_SYSTEM.dealloc(self.slice) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::prim::page_size;

  #[test]
  fn test_extent_rounds_to_pages() {
    let ps = page_size();
    let extent = Extent::new(ps + 1).unwrap();
    assert_eq!(extent.len(), ps * 2);
    assert_eq!(extent.as_ptr() as usize % ps, 0);
  }

  #[test]
  fn test_extent_zero_size() {
    assert!(matches!(
      Extent::new(0),
      Err(ExtentError::SystemError(SysError::InvalidArgument))
    ));
  }

  #[test]
  fn test_extent_as_mut() {
    let ps = page_size();
    let mut extent = Extent::new(ps).unwrap();
    let slice = extent.as_mut();
    slice[ps - 1] = 42;
    assert_eq!(extent.as_ref()[ps - 1], 42);
  }

  #[test]
  fn test_extent_check() {
    let ps = page_size();
    let extent = Extent::new(ps).unwrap();
    assert!(extent.check(0..ps).is_ok());
    assert!(extent.check(100..100).is_ok());
    assert_eq!(extent.check(0..ps + 1), Err(ExtentError::OutOfBounds));
    assert_eq!(extent.check(100..50), Err(ExtentError::OutOfBounds));
  }
}
