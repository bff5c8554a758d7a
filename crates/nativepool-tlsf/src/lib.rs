#![cfg_attr(not(test), no_std)]

//! Two-level segregated fit allocation over caller-provided memory, plus
//! [`DynamicPool`], which owns its memory and hands out offset-based rentals.

mod block;
pub mod config;
mod mapping;
mod pool;
mod tlsf;

pub use block::BlockInfo;
pub use pool::{
  DynamicPool,
  PoolError,
  PoolResult,
  Rental,
};
pub use tlsf::{
  Pool,
  Tlsf,
};


#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TlsfError {
  /// No free block is large enough.
  OutOfMemory,
  /// Zero-sized request, or one at or past [`Tlsf::BLOCK_SIZE_MAX`].
  InvalidSize,
  /// Alignment is not a power of two.
  InvalidAlignment,
  /// Pool region does not start on an [`Tlsf::ALIGN_SIZE`] boundary.
  Misaligned,
  /// Pool region is too small or too large to hold a block.
  PoolSize,
  /// The pointer's block is already free.
  NotAllocated,
  /// The pool still has allocated blocks.
  PoolInUse,
  /// The pool belongs to another allocator.
  ForeignPool,
  /// [`Tlsf::check`] found the free list `(fl, sl)` inconsistent.
  Corrupted { fl: usize, sl: usize },
}

pub type TlsfResult<T> = Result<T, TlsfError>;
