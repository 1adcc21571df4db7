//! User seek schedule.
//!
//! `when` is wall time, `to` is a playback position; both are in seconds as
//! they arrive from the configuration file. The queue is kept sorted by
//! `when` and consumed strictly in order.

use std::collections::VecDeque;

use serde::Deserialize;

/// One scheduled seek.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SeekEvent {
    #[serde(rename = "seek_when")]
    pub when: f64,
    #[serde(rename = "seek_to")]
    pub to: f64,
}

/// JSON shape of a seek configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeekScheduleSource {
    pub seeks: Vec<SeekEvent>,
}

/// Time-ordered queue of pending seeks.
#[derive(Debug, Clone, Default)]
pub struct SeekQueue {
    events: VecDeque<SeekEvent>,
}

impl SeekQueue {
    pub fn new(mut events: Vec<SeekEvent>) -> Self {
        events.sort_by(|a, b| a.when.total_cmp(&b.when));
        Self {
            events: events.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn peek(&self) -> Option<&SeekEvent> {
        self.events.front()
    }

    pub fn pop(&mut self) -> Option<SeekEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_sorted_by_when() {
        let mut queue = SeekQueue::new(vec![
            SeekEvent { when: 9.0, to: 1.0 },
            SeekEvent { when: 2.0, to: 30.0 },
            SeekEvent { when: 5.0, to: 12.0 },
        ]);
        let order: Vec<f64> = std::iter::from_fn(|| queue.pop()).map(|e| e.when).collect();
        assert_eq!(order, vec![2.0, 5.0, 9.0]);
    }

    #[test]
    fn schedule_deserializes() {
        let schedule: SeekScheduleSource =
            serde_json::from_str(r#"{ "seeks": [{ "seek_when": 1.5, "seek_to": 42.0 }] }"#)
                .unwrap();
        assert_eq!(schedule.seeks.len(), 1);
        assert_eq!(schedule.seeks[0].when, 1.5);
        assert_eq!(schedule.seeks[0].to, 42.0);
    }
}
