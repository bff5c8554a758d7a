use super::*;
use crate::{
  block::{
    Block,
    State,
  },
  config::{
    CACHE_LINE,
    MAX_BLOCK_SIZE,
    MAX_BLOCKS,
    MAX_COUNT,
    MAX_OFFSET,
    MIN_BLOCK_SIZE,
  },
};
use std::{
  sync::{
    Arc,
    Barrier,
  },
  thread,
};

fn address(arena: &RewindableArena, rental: &Rental) -> usize {
  arena.get(rental).unwrap().as_ptr() as usize
}

#[test]
fn test_state_packing() {
  let state = State::new(12345, 7);
  assert_eq!(state.offset(), 12345);
  assert_eq!(state.count(), 7);

  let full = State::new(MAX_OFFSET, MAX_COUNT);
  assert_eq!(full.offset(), MAX_OFFSET);
  assert_eq!(full.count(), MAX_COUNT);
  assert_eq!(State::EMPTY.offset(), 0);
  assert_eq!(State::EMPTY.count(), 0);
}

#[test]
fn test_block_reserve_and_release() {
  let block = Block::new(MIN_BLOCK_SIZE).unwrap();
  let block_ref = unsafe { block.as_ref() };
  assert_eq!(block_ref.data().as_ptr() as usize % config::MAX_ALIGNMENT, 0);

  let mask = CACHE_LINE - 1;
  assert_eq!(block_ref.try_reserve(100, 128, mask), Some(0));
  assert_eq!(block_ref.try_reserve(100, 128, mask), Some(128));
  assert_eq!(block_ref.state().count(), 2);
  assert_eq!(block_ref.try_reserve(MIN_BLOCK_SIZE, MIN_BLOCK_SIZE, mask), None);

  block_ref.release(0, 100).unwrap();
  assert_eq!(block_ref.state().offset(), 256);
  block_ref.release(128, 100).unwrap();
  assert_eq!(block_ref.state(), State::EMPTY);
  assert_eq!(block_ref.release(0, 100), Err(ArenaError::NotRented));

  assert_eq!(block_ref.try_reserve(10, 128, mask), Some(0));
  assert_eq!(block_ref.release(4096, 10), Err(ArenaError::NotRented));

  unsafe { Block::destroy(block) };
}

#[test]
fn test_initial_capacity_is_clamped() {
  let _ = env_logger::builder().is_test(true).try_init();

  let small = RewindableArena::new(0, false).unwrap();
  assert_eq!(small.initial_capacity(), MIN_BLOCK_SIZE);
  assert_eq!(small.blocks_allocated(), 1);
  assert_eq!(small.version(), 0);
  assert!(!small.block_free());

  let large = RewindableArena::new(usize::MAX, true).unwrap();
  assert_eq!(large.initial_capacity(), MAX_BLOCK_SIZE);
  assert!(large.block_free());

  let exact = RewindableArena::new(300 * 1024, false).unwrap();
  assert_eq!(exact.initial_capacity(), 300 * 1024);
}

#[test]
fn test_rentals_are_aligned() {
  let arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();

  for size in [1, 17, 128, 129, 1000] {
    let rental = arena.try_rent(size).unwrap();
    assert_eq!(rental.len(), size);
    assert_eq!(address(&arena, &rental) % CACHE_LINE, 0);
  }

  for align in [1, 64, 256, 4096, config::MAX_ALIGNMENT] {
    let rental = arena.try_rent_aligned(10, align).unwrap();
    assert_eq!(address(&arena, &rental) % align, 0, "align {}", align);
  }

  assert_eq!(
    arena.try_rent_aligned(10, 3),
    Err(ArenaError::InvalidAlignment)
  );
  assert_eq!(
    arena.try_rent_aligned(10, config::MAX_ALIGNMENT * 2),
    Err(ArenaError::InvalidAlignment)
  );
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_oversized_request_is_rejected() {
  let arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();
  assert_eq!(arena.try_rent(1 << 41), Err(ArenaError::TooLarge));
  assert_eq!(arena.blocks_allocated(), 1);
}

#[test]
fn test_large_request_gets_its_own_block() {
  let arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();
  let rental = arena.try_rent(MAX_BLOCK_SIZE + 1).unwrap();
  assert_eq!(rental.block(), 1);
  assert_eq!(rental.offset(), 0);
  assert_eq!(arena.blocks_allocated(), 2);
}

#[test]
fn test_blocks_grow_when_full() {
  let _ = env_logger::builder().is_test(true).try_init();

  let arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();
  let mut blocks = Vec::new();
  for _ in 0..48 {
    let rental = arena.try_rent(8 * 1024).unwrap();
    blocks.push(rental.block());
  }

  // 16 rentals fill the first block, the next block is twice as large.
  assert!(blocks[..16].iter().all(|&block| block == 0));
  assert!(blocks[16..].iter().all(|&block| block == 1));
  assert_eq!(arena.blocks_allocated(), 2);

  let spill = arena.try_rent(8 * 1024).unwrap();
  assert_eq!(spill.block(), 2);
  assert_eq!(arena.blocks_allocated(), 3);
}

#[test]
fn test_concurrent_rentals_never_overlap() {
  const THREADS: usize = 8;
  const RENTS: usize = 500;

  let arena = Arc::new(RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap());
  let barrier = Arc::new(Barrier::new(THREADS));

  let handles: Vec<_> = (0..THREADS)
    .map(|id| {
      let arena = Arc::clone(&arena);
      let barrier = Arc::clone(&barrier);
      thread::spawn(move || {
        barrier.wait();
        let mut spans = Vec::with_capacity(RENTS);
        for i in 0..RENTS {
          let size = (i * 37 + id * 11) % 1000 + 1;
          let mut rental = arena.try_rent(size).unwrap();
          arena.get_mut(&mut rental).unwrap().fill(id as u8);
          spans.push((address(&arena, &rental), size, id as u8));
        }
        spans
      })
    })
    .collect();

  let mut spans: Vec<_> = handles
    .into_iter()
    .flat_map(|handle| handle.join().unwrap())
    .collect();
  spans.sort_unstable();

  for pair in spans.windows(2) {
    let (start, len, _) = pair[0];
    assert!(start + len <= pair[1].0, "rentals overlap: {:?}", pair);
  }
  for &(start, len, tag) in &spans {
    let bytes = unsafe { std::slice::from_raw_parts(start as *const u8, len) };
    assert!(bytes.iter().all(|&byte| byte == tag));
  }
  assert!(arena.blocks_allocated() <= MAX_BLOCKS);
}

#[test]
fn test_rewind_reuses_memory() {
  let mut arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();
  let first = arena.try_rent(256).unwrap();
  let first_address = address(&arena, &first);
  let mut stale = arena.try_rent(256).unwrap();

  arena.rewind();
  assert_eq!(arena.version(), 1);

  assert!(arena.get(&first).is_none());
  assert!(arena.get_mut(&mut stale).is_none());
  assert_eq!(arena.give_back(stale), Err(ArenaError::Stale));

  let again = arena.try_rent(256).unwrap();
  assert_eq!(address(&arena, &again), first_address);
  assert_eq!(again.version(), 1);
}

#[test]
fn test_rewind_releases_unused_blocks() {
  let mut arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();
  for _ in 0..3 {
    arena.try_rent(200 * 1024).unwrap();
  }
  assert_eq!(arena.blocks_allocated(), 3);

  // Every block served a rental, so all of them survive.
  arena.rewind();
  assert_eq!(arena.blocks_allocated(), 3);

  // Only the first block is used this time around.
  arena.try_rent(64).unwrap();
  arena.rewind();
  assert_eq!(arena.blocks_allocated(), 1);
  assert_eq!(arena.version(), 2);

  arena.dispose();
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_block_count_is_bounded() {
  let mut arena = RewindableArena::new(MAX_BLOCK_SIZE, false).unwrap();
  while arena.blocks_allocated() < MAX_BLOCKS {
    arena.try_rent(MAX_BLOCK_SIZE).unwrap();
  }

  let err = loop {
    if let Err(err) = arena.try_rent(MAX_BLOCK_SIZE) {
      break err;
    }
  };
  assert_eq!(err, ArenaError::OutOfBlocks);
  assert_eq!(arena.blocks_allocated(), MAX_BLOCKS);

  // Every block is filled to the brim.
  assert_eq!(arena.try_rent(64), Err(ArenaError::OutOfBlocks));

  arena.rewind();
  assert!(arena.blocks_allocated() <= MAX_BLOCKS);
  let rental = arena.try_rent(64).unwrap();
  assert_eq!(rental.offset(), 0);
}

#[test]
fn test_block_free_resets_after_last_return() {
  let arena = RewindableArena::new(MIN_BLOCK_SIZE, true).unwrap();

  let a = arena.try_rent(100).unwrap();
  let b = arena.try_rent(100).unwrap();
  assert_eq!(a.offset(), 0);
  assert_eq!(b.offset(), CACHE_LINE);

  // `b` is still out, so the offset keeps moving forward.
  arena.give_back(a).unwrap();
  let c = arena.try_rent(100).unwrap();
  assert_eq!(c.offset(), 2 * CACHE_LINE);

  arena.give_back(b).unwrap();
  arena.give_back(c).unwrap();
  let d = arena.try_rent(100).unwrap();
  assert_eq!(d.offset(), 0);
}

#[test]
fn test_give_back_without_block_free_is_noop() {
  let mut arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();

  let a = arena.try_rent(100).unwrap();
  arena.give_back(a).unwrap();
  let b = arena.try_rent(100).unwrap();
  assert_eq!(b.offset(), CACHE_LINE);

  arena.set_block_free(true);
  assert!(arena.block_free());
  arena.give_back(b).unwrap();
  // One rental from before the switch is still counted.
  let c = arena.try_rent(100).unwrap();
  assert_eq!(c.offset(), 2 * CACHE_LINE);
}

#[test]
fn test_get_mut_round_trip() {
  let arena = RewindableArena::new(MIN_BLOCK_SIZE, false).unwrap();
  let mut rental = arena.try_rent(64).unwrap();

  let bytes = arena.get_mut(&mut rental).unwrap();
  assert_eq!(bytes.len(), 64);
  bytes.copy_from_slice(&[0x42; 64]);

  assert!(arena.get(&rental).unwrap().iter().all(|&byte| byte == 0x42));
}

#[test]
fn test_rentals_are_bound_to_their_arena() {
  let large = RewindableArena::new(MAX_BLOCK_SIZE, true).unwrap();
  let small = RewindableArena::new(0, true).unwrap();

  let _head = large.try_rent(MAX_BLOCK_SIZE / 2).unwrap();
  let mut tail = large.try_rent(MAX_BLOCK_SIZE / 4).unwrap();
  assert_eq!(tail.block(), 0);
  assert!(tail.offset() + tail.len() > small.initial_capacity());

  assert!(small.get(&tail).is_none());
  assert!(small.get_mut(&mut tail).is_none());

  let own = small.try_rent(64).unwrap();
  assert_eq!(small.give_back(tail), Err(ArenaError::Foreign));
  assert_eq!(small.block(0).unwrap().state().count(), 1);
  small.give_back(own).unwrap();
}

#[test]
fn test_concurrent_rent_and_give_back_with_block_free() {
  const THREADS: usize = 8;
  const ROUNDS: usize = 2000;

  let arena = Arc::new(RewindableArena::new(MIN_BLOCK_SIZE, true).unwrap());
  let barrier = Arc::new(Barrier::new(THREADS));

  let handles: Vec<_> = (0..THREADS)
    .map(|id| {
      let arena = Arc::clone(&arena);
      let barrier = Arc::clone(&barrier);
      thread::spawn(move || {
        barrier.wait();
        let tag = id as u8 + 1;
        for i in 0..ROUNDS {
          let size = (i * 53 + id * 7) % 2000 + 1;
          let mut rental = arena.try_rent(size).unwrap();
          arena.get_mut(&mut rental).unwrap().fill(tag);
          thread::yield_now();
          let bytes = arena.get(&rental).unwrap();
          assert!(bytes.iter().all(|&byte| byte == tag), "rental overwritten");
          arena.give_back(rental).unwrap();
        }
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }

  for index in 0..arena.blocks_allocated() {
    let block = arena.block(index).unwrap();
    assert_eq!(block.state(), State::EMPTY, "block {}", index);
  }
}
