#[cfg(any(target_os = "linux", target_os = "macos"))]
use crate::unix::UNIX_SYSTEM;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SysError {
  Unsupported,
  OutOfMemory,
  InvalidArgument,
}

pub type SysResult<T> = Result<T, SysError>;

/// Source of the backing memory that pools and arena blocks are carved from.
///
/// # Safety
///
/// Implementors must ensure that:
/// - `alloc` returns valid, zero-initialized, page-aligned memory that stays
///   at the same address until it is passed to `dealloc`
/// - `dealloc` only operates on memory previously returned by `alloc`
pub unsafe trait System
where
  Self: Send + Sync,
{
  /// Obtains `size` bytes of read/write memory.
  ///
  /// # Safety
  ///
  /// Caller must ensure `size` is page-aligned and that the returned slice is
  /// eventually handed back through `dealloc` exactly once.
  unsafe fn alloc<'mem>(&self, size: usize) -> SysResult<&'mem mut [u8]> {
    _ = size;
    Err(SysError::Unsupported)
  }

  /// Returns memory to the system.
  ///
  /// # Safety
  ///
  /// Caller must ensure `slice` was returned by `alloc` on this system, is
  /// still live, and will not be accessed after this call.
  unsafe fn dealloc(&self, slice: &[u8]) -> SysResult<()> {
    _ = slice;
    Err(SysError::Unsupported)
  }
}

pub struct UnsupportedSystem {}
unsafe impl System for UnsupportedSystem {}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub static GLOBAL_SYSTEM: &dyn System = &UNIX_SYSTEM;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub static GLOBAL_SYSTEM: &dyn System = &UnsupportedSystem {};
