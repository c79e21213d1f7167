use std::collections::VecDeque;

use bytes::BytesMut;
use microweb::error::WebError;
use microweb::http::writer;
use microweb::server::SessionId;
use microweb::server::pool::BufferPool;

fn owner() -> SessionId {
    SessionId::from_index(0)
}

#[test]
fn test_allocate_until_exhausted() {
    let mut pool = BufferPool::new(16, 3);
    let ids: Vec<_> = (0..3).map(|_| pool.allocate(owner()).unwrap()).collect();
    assert_eq!(pool.available(), 0);
    assert_eq!(pool.in_use(), 3);

    assert!(matches!(pool.allocate(owner()), Err(WebError::Memory)));
    assert_eq!(pool.failed_allocations(), 1);

    pool.release(ids[1]);
    let again = pool.allocate(owner()).unwrap();
    assert_eq!(again, ids[1]);
}

#[test]
fn test_allocated_segment_is_empty_and_owned() {
    let mut pool = BufferPool::new(16, 1);
    let id = pool.allocate(SessionId::from_index(7)).unwrap();
    pool.get_mut(id).append(b"hello");
    pool.release(id);

    let id = pool.allocate(SessionId::from_index(2)).unwrap();
    let segment = pool.get(id);
    assert_eq!(segment.total(), 0);
    assert_eq!(segment.sent(), 0);
    assert_eq!(segment.owner(), Some(SessionId::from_index(2)));
    assert_eq!(pool.owned().count(), 1);
}

#[test]
fn test_double_release_is_harmless() {
    let mut pool = BufferPool::new(16, 2);
    let id = pool.allocate(owner()).unwrap();
    pool.release(id);
    pool.release(id);
    assert_eq!(pool.available(), 2);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn test_flush_spreads_over_segments() {
    let mut pool = BufferPool::new(4, 4);
    let mut queue = VecDeque::new();
    let mut staging = BytesMut::from(&b"abcdefghij"[..]);

    let moved = writer::flush(&mut pool, owner(), &mut queue, &mut staging).unwrap();
    assert_eq!(moved, 10);
    assert!(staging.is_empty());
    assert_eq!(queue.len(), 3);
    let filled: Vec<u8> = queue
        .iter()
        .flat_map(|&id| pool.get(id).filled().to_vec())
        .collect();
    assert_eq!(filled, b"abcdefghij");

    // The partly filled tail is topped up before a new segment is taken.
    staging.extend_from_slice(b"kl");
    writer::flush(&mut pool, owner(), &mut queue, &mut staging).unwrap();
    assert_eq!(queue.len(), 3);
    assert_eq!(pool.get(queue[2]).filled(), b"ijkl");
}

#[test]
fn test_flush_keeps_remainder_when_pool_runs_dry() {
    let mut pool = BufferPool::new(4, 2);
    let mut queue = VecDeque::new();
    let mut staging = BytesMut::from(&b"0123456789"[..]);

    let result = writer::flush(&mut pool, owner(), &mut queue, &mut staging);
    assert!(matches!(result, Err(WebError::Memory)));
    assert_eq!(&staging[..], b"89");
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_release_all_empties_queue() {
    let mut pool = BufferPool::new(4, 4);
    let mut queue = VecDeque::new();
    let mut staging = BytesMut::from(&b"0123456789"[..]);
    writer::flush(&mut pool, owner(), &mut queue, &mut staging).unwrap();

    writer::release_all(&mut pool, &mut queue);
    assert!(queue.is_empty());
    assert_eq!(pool.available(), 4);
}
