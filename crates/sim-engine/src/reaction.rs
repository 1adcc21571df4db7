//! Reaction-time tracking for upward shifts of the sustainable quality.
//!
//! When the network becomes capable of a higher quality, an entry is
//! queued; it completes when playback actually reaches that quality or a
//! later downshift retires it. Entries older than the maximum buffer size
//! are retired FIFO and their reaction time is accrued into the metrics.

use crate::buffer::PlaybackBuffer;
use crate::metrics::Metrics;
use crate::network::SustainableShift;

/// One advertised quality-up event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityUp {
    Pending { at: f64, target: usize },
    Completed { at: f64, target: usize, completed_at: f64 },
}

impl QualityUp {
    fn at(&self) -> f64 {
        match *self {
            QualityUp::Pending { at, .. } | QualityUp::Completed { at, .. } => at,
        }
    }

    fn target(&self) -> usize {
        match *self {
            QualityUp::Pending { target, .. } | QualityUp::Completed { target, .. } => target,
        }
    }

    fn complete(&mut self, now: f64) {
        if let QualityUp::Pending { at, target } = *self {
            *self = QualityUp::Completed {
                at,
                target,
                completed_at: now,
            };
        }
    }
}

#[derive(Debug)]
pub struct ReactionTracker {
    events: Vec<QualityUp>,
    max_buffer_size: f64,
}

impl ReactionTracker {
    pub fn new(max_buffer_size: f64) -> Self {
        Self {
            events: Vec::new(),
            max_buffer_size,
        }
    }

    /// Retire events older than the maximum buffer size, accruing their
    /// reaction time. A still-pending event is charged the full maximum.
    pub fn process(&mut self, now: f64, metrics: &mut Metrics) {
        let cutoff = now - self.max_buffer_size;
        while self.events.first().is_some_and(|e| e.at() < cutoff) {
            let event = self.events.remove(0);
            let reaction = match event {
                QualityUp::Pending { .. } => self.max_buffer_size,
                QualityUp::Completed { at, completed_at, .. } => {
                    self.max_buffer_size.min(completed_at - at)
                }
            };
            metrics.total_reaction_time += reaction;
        }
    }

    /// Playback reached `quality`: complete every pending event it covers.
    pub fn complete_reached(&mut self, quality: usize, now: f64) {
        for event in &mut self.events {
            if matches!(event, QualityUp::Pending { target, .. } if quality >= *target) {
                event.complete(now);
            }
        }
    }

    /// The sustainable quality changed; apply the advertisement filters and
    /// queue a new pending event for a genuine upward switch.
    pub fn advertise(&mut self, shift: SustainableShift, buffer: &PlaybackBuffer, metrics: &mut Metrics) {
        self.process(shift.at, metrics);

        // A downshift retires pending switches above the new level.
        for event in &mut self.events {
            if matches!(event, QualityUp::Pending { target, .. } if *target > shift.quality) {
                event.complete(shift.at);
            }
        }

        if shift.quality <= shift.previous {
            return;
        }
        if buffer.entries().any(|e| shift.quality <= e.quality) {
            return;
        }
        if self.events.iter().any(|e| shift.quality <= e.target()) {
            return;
        }

        self.events.push(QualityUp::Pending {
            at: shift.at,
            target: shift.quality,
        });
    }

    #[cfg(test)]
    fn events(&self) -> &[QualityUp] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(at: f64, quality: usize, previous: usize) -> SustainableShift {
        SustainableShift { at, quality, previous }
    }

    #[test]
    fn upward_shift_is_queued_once() {
        let mut tracker = ReactionTracker::new(25_000.0);
        let buffer = PlaybackBuffer::new(1000.0);
        let mut metrics = Metrics::default();

        tracker.advertise(shift(100.0, 2, 0), &buffer, &mut metrics);
        tracker.advertise(shift(200.0, 2, 1), &buffer, &mut metrics);
        assert_eq!(
            tracker.events(),
            &[QualityUp::Pending { at: 100.0, target: 2 }]
        );
    }

    #[test]
    fn buffered_quality_suppresses_advertisement() {
        let mut tracker = ReactionTracker::new(25_000.0);
        let mut buffer = PlaybackBuffer::new(1000.0);
        buffer.push(0, 3);
        let mut metrics = Metrics::default();

        tracker.advertise(shift(100.0, 2, 0), &buffer, &mut metrics);
        assert!(tracker.events().is_empty());
    }

    #[test]
    fn downshift_completes_pending_entries() {
        let mut tracker = ReactionTracker::new(25_000.0);
        let buffer = PlaybackBuffer::new(1000.0);
        let mut metrics = Metrics::default();

        tracker.advertise(shift(100.0, 2, 0), &buffer, &mut metrics);
        tracker.advertise(shift(500.0, 1, 2), &buffer, &mut metrics);
        assert_eq!(
            tracker.events(),
            &[QualityUp::Completed { at: 100.0, target: 2, completed_at: 500.0 }]
        );
    }

    #[test]
    fn retirement_accrues_reaction_time() {
        let mut tracker = ReactionTracker::new(10_000.0);
        let buffer = PlaybackBuffer::new(1000.0);
        let mut metrics = Metrics::default();

        tracker.advertise(shift(0.0, 1, 0), &buffer, &mut metrics);
        tracker.complete_reached(1, 4000.0);
        tracker.process(10_500.0, &mut metrics);
        assert!(tracker.events().is_empty());
        assert_eq!(metrics.total_reaction_time, 4000.0);
    }

    #[test]
    fn pending_retirement_charges_the_maximum() {
        let mut tracker = ReactionTracker::new(10_000.0);
        let buffer = PlaybackBuffer::new(1000.0);
        let mut metrics = Metrics::default();

        tracker.advertise(shift(0.0, 1, 0), &buffer, &mut metrics);
        tracker.process(20_000.0, &mut metrics);
        assert_eq!(metrics.total_reaction_time, 10_000.0);
    }
}
