#![cfg_attr(not(test), no_std)]

//! A rewindable, lock-free-on-the-fast-path arena.

mod arena;
mod block;
pub mod config;

pub use arena::{
  Rental,
  RewindableArena,
};

use nativepool_sys::extent::ExtentError;

#[cfg(test)]
mod tests;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArenaError {
  Extent(ExtentError),
  /// Alignment is not a power of two or exceeds [`config::MAX_ALIGNMENT`].
  InvalidAlignment,
  /// Request does not fit the 40-bit block offset.
  TooLarge,
  /// All [`config::MAX_BLOCKS`] block slots are taken.
  OutOfBlocks,
  OutOfMemory,
  Overflow,
  /// The rental was issued by another arena.
  Foreign,
  /// The rental predates the last rewind.
  Stale,
  /// The rental's range is not live in its block.
  NotRented,
}

impl From<ExtentError> for ArenaError {
  fn from(err: ExtentError) -> Self {
    ArenaError::Extent(err)
  }
}

pub type ArenaResult<T> = Result<T, ArenaError>;
