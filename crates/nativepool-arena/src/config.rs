/// Default rental alignment, and the granularity larger alignments are
/// rounded up to.
pub const CACHE_LINE: usize = 128;

/// Block data starts on this boundary, so no rental may ask for more.
pub const MAX_ALIGNMENT: usize = 16384;

pub const MIN_BLOCK_SIZE: usize = 128 * 1024;
pub const MAX_BLOCK_SIZE: usize = 1 << 26;
pub const MAX_BLOCKS: usize = 64;

pub const OFFSET_BITS: u32 = 40;
pub const COUNT_BITS: u32 = 24;

/// Largest bump offset the packed block state can hold.
pub const MAX_OFFSET: u64 = (1 << OFFSET_BITS) - 1;
/// Largest number of live rentals one block can track.
pub const MAX_COUNT: u64 = (1 << COUNT_BITS) - 1;

const _: () = assert!(OFFSET_BITS + COUNT_BITS == u64::BITS);
const _: () = assert!(MAX_BLOCK_SIZE as u64 <= MAX_OFFSET);
