//! Pre-roll ring buffer
//!
//! Always records the most recent window of microphone audio so the
//! syllables spoken during the onset debounce can be replayed to the
//! remote session once speech is confirmed.

/// Fixed-capacity ring of raw samples with a once-per-onset flush
#[derive(Debug, Clone)]
pub struct PreRollBuffer {
    samples: Vec<f32>,
    offset: usize,
    sent: bool,
}

impl PreRollBuffer {
    /// Create a zero-filled buffer holding `capacity` samples
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "pre-roll capacity must be non-zero");
        Self {
            samples: vec![0.0; capacity],
            offset: 0,
            sent: false,
        }
    }

    /// Record a frame, overwriting the oldest samples
    pub fn push(&mut self, frame: &[f32]) {
        let capacity = self.samples.len();
        if frame.len() >= capacity {
            self.samples
                .copy_from_slice(&frame[frame.len() - capacity..]);
            self.offset = 0;
            return;
        }

        for &sample in frame {
            self.samples[self.offset] = sample;
            self.offset = (self.offset + 1) % capacity;
        }
    }

    /// Buffer contents ordered oldest to newest
    #[must_use]
    pub fn snapshot(&self) -> Vec<f32> {
        let mut ordered = Vec::with_capacity(self.samples.len());
        ordered.extend_from_slice(&self.samples[self.offset..]);
        ordered.extend_from_slice(&self.samples[..self.offset]);
        ordered
    }

    /// Take the contents for the current onset
    ///
    /// Returns `None` if the pre-roll was already sent since the last
    /// [`rearm`](Self::rearm).
    pub fn take_once(&mut self) -> Option<Vec<f32>> {
        if self.sent {
            return None;
        }
        self.sent = true;
        Some(self.snapshot())
    }

    /// Allow the next onset to flush the buffer again
    pub const fn rearm(&mut self) {
        self.sent = false;
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}
