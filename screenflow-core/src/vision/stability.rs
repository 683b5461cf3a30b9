//! Frame settling and result debouncing.

use crate::geometry::Point;

/// Counts consecutive frames whose change ratio stayed under a threshold.
#[derive(Debug, Clone)]
pub struct SettleTracker {
    counter: u32,
    cap: u32,
    min_settle: u32,
    change_threshold: f64,
}

impl SettleTracker {
    pub fn new(change_threshold: f64, cap: u32, min_settle: u32) -> Self {
        Self {
            counter: 0,
            cap,
            min_settle,
            change_threshold,
        }
    }

    /// Fold in the change ratio between the previous and current frame.
    pub fn record(&mut self, ratio: f64) {
        if ratio < self.change_threshold {
            self.counter = (self.counter + 1).min(self.cap);
        } else {
            self.counter = 0;
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Matching is allowed once the counter exceeds the minimum.
    pub fn is_settled(&self) -> bool {
        self.counter > self.min_settle
    }
}

/// Surfaces a point only after it repeated on enough consecutive frames.
#[derive(Debug, Clone)]
pub struct StabilityGate {
    required: u32,
    last: Option<Point>,
    run: u32,
}

impl StabilityGate {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            last: None,
            run: 0,
        }
    }

    /// Feed one frame's result; returns the point once it is stable.
    pub fn observe(&mut self, result: Option<Point>) -> Option<Point> {
        let Some(point) = result else {
            self.reset();
            return None;
        };
        if self.last == Some(point) {
            self.run = self.run.saturating_add(1);
        } else {
            self.last = Some(point);
            self.run = 1;
        }
        (self.run >= self.required).then_some(point)
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.run = 0;
    }

    pub fn run(&self) -> u32 {
        self.run
    }
}
