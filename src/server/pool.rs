//! Transmit segment pool
//!
//! All outbound bytes travel in fixed-capacity segments drawn from one pool
//! owned by the server context. A segment is owned by exactly one session
//! from `allocate` until `release`.

use crate::error::WebError;
use crate::server::registry::SessionId;

/// Stable index of a segment inside its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

/// A fixed-capacity chunk of one session's outbound byte stream
#[derive(Debug)]
pub struct Segment {
    data: Box<[u8]>,
    /// Bytes filled
    total: usize,
    /// Bytes already handed to the transport
    sent: usize,
    /// Owning session; `None` while the segment is free
    owner: Option<SessionId>,
}

impl Segment {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            total: 0,
            sent: 0,
            owner: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn space(&self) -> usize {
        self.data.len() - self.total
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.total]
    }

    pub fn unsent(&self) -> &[u8] {
        &self.data[self.sent..self.total]
    }

    pub fn is_drained(&self) -> bool {
        self.sent == self.total
    }

    /// Copies as much of `bytes` as fits and returns the count taken.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.space());
        self.data[self.total..self.total + n].copy_from_slice(&bytes[..n]);
        self.total += n;
        n
    }

    /// Records `n` more bytes as transmitted.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.sent + n <= self.total);
        self.sent = (self.sent + n).min(self.total);
    }
}

/// Fixed pool of transmit segments
#[derive(Debug)]
pub struct BufferPool {
    segments: Vec<Segment>,
    free: Vec<SegmentId>,
    /// Set while allocations are failing, so exhaustion is logged once
    exhausted: bool,
    failed_allocations: u64,
}

impl BufferPool {
    /// Create a pool of `count` segments of `segment_size` bytes each
    pub fn new(segment_size: usize, count: usize) -> Self {
        let segments = (0..count).map(|_| Segment::new(segment_size)).collect();
        // Pop from the back hands out low indices first.
        let free = (0..count).rev().map(SegmentId).collect();

        Self {
            segments,
            free,
            exhausted: false,
            failed_allocations: 0,
        }
    }

    /// Take a free segment for `owner`
    ///
    /// Never blocks; fails with `Memory` when every segment is in use.
    pub fn allocate(&mut self, owner: SessionId) -> Result<SegmentId, WebError> {
        let Some(id) = self.free.pop() else {
            self.failed_allocations += 1;
            if !self.exhausted {
                self.exhausted = true;
                tracing::warn!(
                    segments = self.segments.len(),
                    session = ?owner,
                    "Transmit buffer pool exhausted"
                );
            }
            return Err(WebError::Memory);
        };

        if self.exhausted {
            self.exhausted = false;
            tracing::info!(free = self.free.len() + 1, "Transmit buffer pool recovered");
        }

        let segment = &mut self.segments[id.0];
        segment.owner = Some(owner);
        segment.total = 0;
        segment.sent = 0;
        Ok(id)
    }

    /// Return a segment to the pool
    ///
    /// Releasing a segment that is already free is logged and ignored.
    pub fn release(&mut self, id: SegmentId) {
        let segment = &mut self.segments[id.0];
        if segment.owner.take().is_none() {
            tracing::error!(segment = id.0, "Release of a segment that is not in use");
            return;
        }
        segment.total = 0;
        segment.sent = 0;
        self.free.push(id);
    }

    pub fn get(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0]
    }

    pub fn get_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id.0]
    }

    pub fn segment_size(&self) -> usize {
        self.segments.first().map_or(0, Segment::capacity)
    }

    pub fn capacity(&self) -> usize {
        self.segments.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.segments.len() - self.free.len()
    }

    pub fn failed_allocations(&self) -> u64 {
        self.failed_allocations
    }

    /// Iterate over segments currently owned by a session
    pub fn owned(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.owner.is_some())
            .map(|(i, s)| (SegmentId(i), s))
    }
}
