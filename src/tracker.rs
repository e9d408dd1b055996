//! Touch samples, and the per-slot multitouch tracker that derives them from
//! raw slot events.

use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchAction {
    Down,
    PointerDown,
    Move,
    Up,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One touch report in surface coordinates. `points[0]` is the primary
/// pointer; `points[1]` is only meaningful when `pointer_count >= 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchSample {
    pub action: TouchAction,
    pub pointer_count: usize,
    pub points: [Point; 2],
    pub timestamp_ms: u64,
}

impl TouchSample {
    pub fn single(action: TouchAction, x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            action,
            pointer_count: 1,
            points: [Point::new(x, y), Point::default()],
            timestamp_ms,
        }
    }

    pub fn pair(action: TouchAction, p0: Point, p1: Point, timestamp_ms: u64) -> Self {
        Self {
            action,
            pointer_count: 2,
            points: [p0, p1],
            timestamp_ms,
        }
    }

    pub fn with_pointer_count(mut self, pointer_count: usize) -> Self {
        self.pointer_count = pointer_count;
        self
    }

    pub fn x(&self) -> f32 {
        self.points[0].x
    }

    pub fn y(&self) -> f32 {
        self.points[0].y
    }

    /// Finger spacing between the first two pointers.
    pub fn spacing(&self) -> f32 {
        self.points[0].distance(self.points[1])
    }
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    tracking_id: i32, // -1 = inactive
    x_norm: f32,
    y_norm: f32,
    active: bool,
}

#[derive(Debug)]
pub struct Tracker {
    slots: Vec<SlotState>,
    cur_slot: i32,
    // normalization
    x_min: i32,
    x_max: i32,
    y_min: i32,
    y_max: i32,
    // surface size the normalized positions are scaled to
    width: f32,
    height: f32,
    start_instant: Instant,
    prev_points: Vec<Point>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            slots: vec![SlotState::default(); 10],
            cur_slot: 0,
            x_min: 0,
            x_max: 4096,
            y_min: 0,
            y_max: 4096,
            width: 1.0,
            height: 1.0,
            start_instant: Instant::now(),
            prev_points: Vec::new(),
        }
    }

    pub fn set_norm_ranges(&mut self, x_min: i32, x_max: i32, y_min: i32, y_max: i32) {
        self.x_min = x_min;
        self.x_max = x_max.max(x_min + 1);
        self.y_min = y_min;
        self.y_max = y_max.max(y_min + 1);
    }

    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1) as f32;
        self.height = height.max(1) as f32;
    }

    pub fn now_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    pub fn on_slot(&mut self, slot: i32) {
        self.cur_slot = slot.clamp(0, (self.slots.len() as i32) - 1);
    }

    pub fn on_tracking_id(&mut self, tracking_id: i32) {
        let s = &mut self.slots[self.cur_slot as usize];
        if tracking_id < 0 {
            s.tracking_id = -1;
            s.active = false;
        } else {
            // a new contact starts where the slot last was until X/Y arrive
            s.tracking_id = tracking_id;
            s.active = true;
        }
    }

    pub fn on_pos_x(&mut self, raw: i32) {
        let nx = ((raw - self.x_min) as f32 / (self.x_max - self.x_min) as f32).clamp(0.0, 1.0);
        self.slots[self.cur_slot as usize].x_norm = nx;
    }

    pub fn on_pos_y(&mut self, raw: i32) {
        let ny = ((raw - self.y_min) as f32 / (self.y_max - self.y_min) as f32).clamp(0.0, 1.0);
        self.slots[self.cur_slot as usize].y_norm = ny;
    }

    pub fn on_syn_report(&mut self) -> Vec<TouchSample> {
        let now = self.now_ms();
        self.on_syn_report_at(now)
    }

    /// Close a frame and translate the change in active contacts into
    /// samples. Pointer order follows slot order.
    pub fn on_syn_report_at(&mut self, now_ms: u64) -> Vec<TouchSample> {
        let points: Vec<Point> = self
            .slots
            .iter()
            .filter(|s| s.active && s.tracking_id >= 0)
            .map(|s| Point::new(s.x_norm * self.width, s.y_norm * self.height))
            .collect();
        let prev = std::mem::replace(&mut self.prev_points, points.clone());
        let (n, p) = (points.len(), prev.len());

        let mut out = Vec::new();
        if n > p {
            if p == 0 {
                out.push(sample(TouchAction::Down, &points[..1], now_ms));
            }
            if n >= 2 {
                out.push(sample(TouchAction::PointerDown, &points, now_ms));
            }
        } else if n < p {
            // lifted contacts report their last known position
            if p >= 2 {
                out.push(sample(TouchAction::Up, &prev, now_ms));
            }
            if n == 0 {
                out.push(sample(TouchAction::Up, &prev[..1], now_ms));
            }
        } else if n > 0 && points != prev {
            out.push(sample(TouchAction::Move, &points, now_ms));
        }
        out
    }
}

fn sample(action: TouchAction, points: &[Point], timestamp_ms: u64) -> TouchSample {
    TouchSample {
        action,
        pointer_count: points.len(),
        points: [
            points.first().copied().unwrap_or_default(),
            points.get(1).copied().unwrap_or_default(),
        ],
        timestamp_ms,
    }
}
