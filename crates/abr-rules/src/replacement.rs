//! Segment replacement policies: re-download an already-buffered segment
//! at a higher quality.
//!
//! Only slots comfortably ahead of the play head are considered: the scan
//! skips `ceil(1.5 + fcc/segment_time)` entries so the replacement has a
//! chance to land before playback reaches it.

use sim_engine::{Abandon, DownloadProgress, Replacement, SessionView};

/// Never replace anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplace;

impl Replacement for NoReplace {
    fn check_replace(&mut self, _view: &SessionView<'_>, _quality: usize) -> Option<isize> {
        None
    }
}

/// Which end of the eligible window to scan first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Forward from the play head: upgrade what plays soonest.
    Left,
    /// Backward from the buffer end: upgrade what plays last.
    Right,
}

/// Replace the first buffered entry whose quality falls below the newly
/// chosen one, scanning in the configured direction.
#[derive(Debug)]
pub struct Replace {
    direction: ScanDirection,
    /// Negative offset of the slot currently being replaced, if any.
    replacing: Option<isize>,
}

impl Replace {
    pub fn new(direction: ScanDirection) -> Self {
        Self {
            direction,
            replacing: None,
        }
    }
}

impl Replacement for Replace {
    fn check_replace(&mut self, view: &SessionView<'_>, quality: usize) -> Option<isize> {
        self.replacing = None;

        let buffer = view.buffer;
        let skip = (1.5 + buffer.fcc() / view.manifest.segment_time).ceil() as usize;
        let len = buffer.len();

        let mut scan = |index: usize| -> bool {
            if buffer.quality_at(index).is_some_and(|q| q < quality) {
                self.replacing = Some(index as isize - len as isize);
                true
            } else {
                false
            }
        };

        match self.direction {
            ScanDirection::Left => {
                for index in skip..len {
                    if scan(index) {
                        break;
                    }
                }
            }
            ScanDirection::Right => {
                for index in (skip..len).rev() {
                    if scan(index) {
                        break;
                    }
                }
            }
        }

        self.replacing
    }

    fn check_abandon(
        &mut self,
        view: &SessionView<'_>,
        _progress: &DownloadProgress,
        buffer_level: f64,
    ) -> Option<Abandon> {
        let offset = self.replacing?;
        // Playback caught up with the slot being replaced.
        if buffer_level + view.manifest.segment_time * offset as f64 <= 0.0 {
            return Some(Abandon::TooLate);
        }
        None
    }
}
