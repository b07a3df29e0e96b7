//! Height and calendar-day bounds of a run.

use chrono::NaiveDate;
use oracle_core::{utc_date, Height, TimestampSecs};
use serde::{Deserialize, Serialize};

/// What the producer does with a pulled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundCheck {
    /// Below the requested range; drop it and keep pulling.
    Skip,
    /// Inside the range.
    Take,
    /// Inside the range and the last one the bounds allow.
    TakeLast,
    /// Past the range; stop without using it.
    Stop,
}

/// Restricts a run to a height range and/or one UTC day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBounds {
    /// First height to analyse.
    pub start_height: Option<Height>,
    /// Last height to analyse.
    pub end_height: Option<Height>,
    /// Only blocks whose header timestamp falls on this UTC day.
    pub utc_day: Option<NaiveDate>,
}

impl RunBounds {
    /// Everything the source yields.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Inclusive height range.
    pub fn heights(start: Height, end: Height) -> Self {
        Self {
            start_height: Some(start),
            end_height: Some(end),
            utc_day: None,
        }
    }

    /// A single UTC day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            utc_day: Some(date),
            ..Self::default()
        }
    }

    /// The last `count` (at least one) of the `available` heights, which must
    /// be ascending. Unbounded when nothing is available.
    pub fn recent(available: &[Height], count: usize) -> Self {
        let first = available.len().saturating_sub(count.max(1));
        match available.get(first) {
            Some(&start) => Self::unbounded().with_start(start),
            None => Self::unbounded(),
        }
    }

    pub fn with_start(mut self, height: Height) -> Self {
        self.start_height = Some(height);
        self
    }

    pub fn with_end(mut self, height: Height) -> Self {
        self.end_height = Some(height);
        self
    }

    /// Whether the day bound needs the block timestamp.
    pub fn needs_timestamp(&self) -> bool {
        self.utc_day.is_some()
    }

    /// Classify a block by height and, when known, header timestamp.
    ///
    /// A block whose timestamp is unknown is taken when it is inside the
    /// height range; its decode failure is reported downstream.
    pub fn check(&self, height: Height, timestamp: Option<TimestampSecs>) -> BoundCheck {
        if self.start_height.is_some_and(|start| height < start) {
            return BoundCheck::Skip;
        }
        if self.end_height.is_some_and(|end| height > end) {
            return BoundCheck::Stop;
        }

        if let (Some(day), Some(ts)) = (self.utc_day, timestamp) {
            match utc_date(ts) {
                Some(date) if date < day => return BoundCheck::Skip,
                Some(date) if date > day => return BoundCheck::Stop,
                _ => {}
            }
        }

        if self.end_height == Some(height) {
            BoundCheck::TakeLast
        } else {
            BoundCheck::Take
        }
    }
}
