//! buffer - a preallocated frame buffer with reserved headroom

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("Insufficient headroom: need {needed} bytes, have {available}")]
    InsufficientHeadroom { needed: usize, available: usize },
    #[error("Cannot shrink {requested} bytes from a {len} byte frame")]
    ShrinkPastEnd { requested: usize, len: usize },
    #[error("Frame of {len} bytes does not fit in {capacity} bytes of tailroom")]
    FrameTooLarge { len: usize, capacity: usize },
}

/// One Ethernet frame held in a fixed allocation, with space reserved in front of it
/// so that headers can be prepended without moving the payload.
///
/// The allocation is made once (per worker) and reused for every received frame.
pub struct FrameBuffer {
    storage: Box<[u8]>,
    head: usize,
    tail: usize,
    reserved_headroom: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize, headroom: usize) -> Self {
        let headroom = headroom.min(capacity);
        FrameBuffer {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: headroom,
            tail: headroom,
            reserved_headroom: headroom,
        }
    }

    /// Build a buffer holding a copy of `frame`, with `headroom` free bytes in front of it.
    pub fn from_frame(frame: &[u8], headroom: usize) -> Self {
        let mut storage = vec![0u8; headroom + frame.len()];
        storage[headroom..].copy_from_slice(frame);
        FrameBuffer {
            storage: storage.into_boxed_slice(),
            head: headroom,
            tail: headroom + frame.len(),
            reserved_headroom: headroom,
        }
    }

    /// Replace the contents with a copy of `frame`, restoring the full headroom.
    pub fn load(&mut self, frame: &[u8]) -> Result<(), BufferError> {
        let capacity = self.storage.len() - self.reserved_headroom;
        if frame.len() > capacity {
            return Err(BufferError::FrameTooLarge {
                len: frame.len(),
                capacity,
            });
        }
        self.receive_space()[..frame.len()].copy_from_slice(frame);
        self.commit_received(frame.len())
    }

    /// The area a frame should be received into.  Resets the buffer.
    pub fn receive_space(&mut self) -> &mut [u8] {
        self.head = self.reserved_headroom;
        self.tail = self.reserved_headroom;
        &mut self.storage[self.reserved_headroom..]
    }

    /// Mark `len` bytes written through `receive_space()` as the current frame.
    pub fn commit_received(&mut self, len: usize) -> Result<(), BufferError> {
        let capacity = self.storage.len() - self.reserved_headroom;
        if len > capacity {
            return Err(BufferError::FrameTooLarge { len, capacity });
        }
        self.head = self.reserved_headroom;
        self.tail = self.reserved_headroom + len;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.storage[self.head..self.tail]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.head..self.tail]
    }

    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn headroom(&self) -> usize {
        self.head
    }

    /// Extend the frame by `n` bytes at the front.  The new bytes hold stale data.
    pub fn grow_front(&mut self, n: usize) -> Result<(), BufferError> {
        if n > self.head {
            return Err(BufferError::InsufficientHeadroom {
                needed: n,
                available: self.head,
            });
        }
        self.head -= n;
        Ok(())
    }

    /// Drop `n` bytes from the front of the frame, returning them to the headroom.
    pub fn shrink_front(&mut self, n: usize) -> Result<(), BufferError> {
        if n > self.len() {
            return Err(BufferError::ShrinkPastEnd {
                requested: n,
                len: self.len(),
            });
        }
        self.head += n;
        Ok(())
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("headroom", &self.head)
            .field("len", &self.len())
            .finish()
    }
}
