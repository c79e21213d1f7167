//! Moves response bytes through transmit segments.
//!
//! Produced bytes are staged, copied into the tail segment of the session's
//! queue (allocating more as needed) and later written to the transport from
//! the front of the queue. Drained segments go straight back to the pool.

use std::collections::VecDeque;
use std::io;

use bytes::{Buf, BytesMut};

use crate::error::WebError;
use crate::server::pool::{BufferPool, SegmentId};
use crate::server::registry::SessionId;
use crate::server::transport::{ConnHandle, Transport};

/// Copies staged bytes into the queue, returning how many moved.
///
/// Stops with `Memory` when the pool runs dry; whatever did not fit stays
/// staged for a later attempt.
pub fn flush(
    pool: &mut BufferPool,
    owner: SessionId,
    queue: &mut VecDeque<SegmentId>,
    staging: &mut BytesMut,
) -> Result<usize, WebError> {
    let mut moved = 0;
    while !staging.is_empty() {
        let tail = queue
            .back()
            .copied()
            .filter(|&id| pool.get(id).space() > 0);
        let id = match tail {
            Some(id) => id,
            None => {
                let id = pool.allocate(owner)?;
                queue.push_back(id);
                id
            }
        };
        let n = pool.get_mut(id).append(staging.chunk());
        staging.advance(n);
        moved += n;
    }
    Ok(moved)
}

/// Writes queued segments until the transport would block or the queue is
/// empty. Returns the number of bytes written.
pub fn drain<T: Transport + ?Sized>(
    transport: &mut T,
    conn: ConnHandle,
    pool: &mut BufferPool,
    queue: &mut VecDeque<SegmentId>,
) -> Result<usize, WebError> {
    let mut written = 0;
    while let Some(&id) = queue.front() {
        let segment = pool.get(id);
        if segment.is_drained() {
            queue.pop_front();
            pool.release(id);
            continue;
        }
        match transport.write(conn, segment.unsent()) {
            Ok(0) => {
                return Err(WebError::Socket(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed while writing",
                )));
            }
            Ok(n) => {
                tracing::trace!(segment = ?id, bytes = n, "Wrote segment data");
                pool.get_mut(id).advance(n);
                written += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WebError::Socket(e)),
        }
    }
    Ok(written)
}

/// Returns every queued segment to the pool.
pub fn release_all(pool: &mut BufferPool, queue: &mut VecDeque<SegmentId>) {
    for id in queue.drain(..) {
        pool.release(id);
    }
}
