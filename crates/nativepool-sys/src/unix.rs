#[cfg(any(target_os = "linux", target_os = "macos"))]
use crate::{
  prim::is_page_aligned,
  system::{
    SysError,
    SysResult,
    System,
  },
};

pub struct UnixSystem {}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub static UNIX_SYSTEM: UnixSystem = UnixSystem {};

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl UnixSystem {
  const fn prot() -> i32 {
    libc::PROT_READ | libc::PROT_WRITE
  }

  const fn flags() -> i32 {
    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS
  }

  const fn as_c(slice: &[u8]) -> *mut libc::c_void {
    slice.as_ptr() as *mut libc::c_void
  }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
unsafe impl System for UnixSystem {
  unsafe fn alloc<'mem>(&self, size: usize) -> SysResult<&'mem mut [u8]> {
    if size == 0 || is_page_aligned(size) != Ok(true) {
      return Err(SysError::InvalidArgument);
    }

    let ptr = unsafe {
      libc::mmap(
        core::ptr::null_mut(),
        size,
        Self::prot(),
        Self::flags(),
        -1,
        0,
      )
    };

    if ptr == libc::MAP_FAILED {
      return Err(SysError::OutOfMemory);
    }

    log::trace!("mapped {} bytes at {:p}", size, ptr);
    let slice = unsafe { core::slice::from_raw_parts_mut(ptr as *mut u8, size) };
    Ok(slice)
  }

  unsafe fn dealloc(&self, slice: &[u8]) -> SysResult<()> {
    let result = unsafe { libc::munmap(Self::as_c(slice), slice.len()) };
    if result == 0 {
      log::trace!("unmapped {} bytes at {:p}", slice.len(), slice.as_ptr());
      return Ok(());
    }

    Err(SysError::InvalidArgument)
  }
}
