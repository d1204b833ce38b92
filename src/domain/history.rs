use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 24h of samples at a 5-minute cadence.
pub const HISTORY_CAPACITY: usize = 288;

/// One chart sample of a room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Time of day in minutes
    pub time: f64,
    pub vwc: f64,
    pub temp: f64,
    pub rh: f64,
    pub vpd: f64,
    pub ec: f64,
    pub co2: f64,
    pub phase: u8,
    /// 1 if the valve was open during the sample window
    pub valve: u8,
}

/// Fixed-capacity FIFO of history points. Oldest entries are evicted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<HistoryPoint>", into = "Vec<HistoryPoint>")]
pub struct HistoryBuffer {
    points: VecDeque<HistoryPoint>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            points: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, point: HistoryPoint) {
        if self.points.len() == HISTORY_CAPACITY {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn last_mut(&mut self) -> Option<&mut HistoryPoint> {
        self.points.back_mut()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    /// VWC swing (max - min) across the window.
    pub fn vwc_range(&self) -> f64 {
        let mut iter = self.points.iter().map(|p| p.vwc);
        let Some(first) = iter.next() else {
            return 0.0;
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        max - min
    }
}

impl From<Vec<HistoryPoint>> for HistoryBuffer {
    fn from(points: Vec<HistoryPoint>) -> Self {
        let mut buffer = Self::new();
        for point in points {
            buffer.push(point);
        }
        buffer
    }
}

impl From<HistoryBuffer> for Vec<HistoryPoint> {
    fn from(buffer: HistoryBuffer) -> Self {
        buffer.points.into_iter().collect()
    }
}
