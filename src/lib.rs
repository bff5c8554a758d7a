#![no_std]

//! Native memory pools: a TLSF allocator, a rewindable concurrent arena and
//! fixed-size bitmap index pools.

pub use nativepool_arena as arena;
pub use nativepool_bitmap as bitmap;
pub use nativepool_sys as sys;
pub use nativepool_tlsf as tlsf;

pub mod prelude {
  pub use nativepool_arena::{
    ArenaError,
    ArenaResult,
    Rental as ArenaRental,
    RewindableArena,
  };
  pub use nativepool_bitmap::{
    ConcurrentIndexPool4096,
    IndexError,
    IndexPool4096,
    IndexResult,
  };
  pub use nativepool_sys::prelude::*;
  pub use nativepool_tlsf::{
    DynamicPool,
    Pool,
    PoolError,
    PoolResult,
    Rental as PoolRental,
    Tlsf,
    TlsfError,
    TlsfResult,
  };
}
