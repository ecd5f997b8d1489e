//! Sliding window of the most recent frames and the clips cut from it

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::capture::Frame;

/// Ordered, fixed-length run of frames, oldest first.
///
/// A clip owns its frame list. Frames themselves are immutable, so clips
/// taken from the same window never observe each other's changes.
#[derive(Debug, Clone)]
pub struct Clip {
    frames: Vec<Frame>,
    padded: usize,
}

impl Clip {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, padded: 0 }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Leading frames that repeat the oldest real frame because the window
    /// was not yet full.
    pub fn padded(&self) -> usize {
        self.padded
    }

    /// Frame index of the newest frame, the reference point for staleness.
    pub fn last_sequence(&self) -> Option<u64> {
        self.frames.last().map(Frame::sequence)
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.frames.iter().map(Frame::sequence).collect()
    }
}

/// Ring buffer of the last `N` frames.
///
/// Until `N` real frames have arrived, snapshots are padded at the front with
/// copies of the oldest frame, so every clip has exactly `N` frames.
pub struct ClipWindow {
    ring: HeapRb<Frame>,
}

impl ClipWindow {
    /// # Panics
    ///
    /// Panics if `length` is zero.
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "clip window needs at least one frame");
        Self {
            ring: HeapRb::new(length),
        }
    }

    /// Shift in a frame, evicting the oldest one when full.
    pub fn push(&mut self, frame: Frame) {
        self.ring.push_overwrite(frame);
    }

    /// Independent copy of the window, oldest first. `None` while empty.
    pub fn snapshot(&self) -> Option<Clip> {
        let oldest = self.ring.iter().next()?;
        let length = self.length();
        let padded = length - self.ring.occupied_len();

        let mut frames = Vec::with_capacity(length);
        frames.extend(std::iter::repeat(oldest).take(padded).cloned());
        frames.extend(self.ring.iter().cloned());

        Some(Clip { frames, padded })
    }

    pub fn length(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Real frames currently held.
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn frame(seq: u64) -> Frame {
        Frame::new(1, 1, PixelFormat::Gray8, vec![seq as u8]).stamped(seq)
    }

    #[test]
    fn empty_window_has_no_snapshot() {
        let window = ClipWindow::new(3);
        assert!(window.snapshot().is_none());
    }

    #[test]
    fn snapshot_returns_last_n_in_push_order() {
        for length in 1..=6 {
            for pushes in length as u64..20 {
                let mut window = ClipWindow::new(length);
                for seq in 1..=pushes {
                    window.push(frame(seq));
                }

                let clip = window.snapshot().unwrap();
                let expected: Vec<u64> = (pushes - length as u64 + 1..=pushes).collect();
                assert_eq!(clip.sequences(), expected);
                assert_eq!(clip.padded(), 0);
            }
        }
    }

    #[test]
    fn partial_window_pads_with_oldest_frame() {
        let mut window = ClipWindow::new(5);
        window.push(frame(1));
        window.push(frame(2));

        let clip = window.snapshot().unwrap();
        assert_eq!(clip.len(), 5);
        assert_eq!(clip.padded(), 3);
        assert_eq!(clip.sequences(), vec![1, 1, 1, 1, 2]);
        assert!(!window.is_full());
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn snapshots_are_independent_copies() {
        let mut window = ClipWindow::new(3);
        for seq in 1..=4 {
            window.push(frame(seq));
        }

        let mut first = window.snapshot().unwrap();
        let second = window.snapshot().unwrap();
        assert_eq!(first.sequences(), second.sequences());

        first.frames_mut()[0] = frame(99);
        first.frames_mut().pop();
        assert_eq!(second.sequences(), vec![2, 3, 4]);

        window.push(frame(5));
        assert_eq!(second.sequences(), vec![2, 3, 4]);
        assert_eq!(window.snapshot().unwrap().sequences(), vec![3, 4, 5]);
    }
}
