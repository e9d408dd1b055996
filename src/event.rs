//! Outward notifications.

use log::{debug, trace};
use serde::Serialize;
use std::{fmt, sync::mpsc::Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Activity {
    Active,
    Focus,
    Success,
    Failed,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FocusBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FocusBounds {
    pub fn around(x: i32, y: i32, half_extent: i32) -> Self {
        Self {
            left: x.saturating_sub(half_extent),
            top: y.saturating_sub(half_extent),
            right: x.saturating_add(half_extent),
            bottom: y.saturating_add(half_extent),
        }
    }
}

impl fmt::Display for FocusBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(rename = "ACTIVITY")]
    pub activity: Activity,
    #[serde(rename = "BOUNDS", skip_serializing_if = "Option::is_none")]
    pub bounds: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    PressStart { x: f32, y: f32 },
    Hold { x: f32, y: f32 },
    LongPress { x: f32, y: f32 },
    Press { x: f32, y: f32 },
    ZoomComplete { current: i32, max: i32 },
    Message(Message),
}

impl Event {
    pub fn message(activity: Activity) -> Self {
        Event::Message(Message {
            activity,
            bounds: None,
        })
    }

    pub fn message_with_bounds(activity: Activity, bounds: FocusBounds) -> Self {
        Event::Message(Message {
            activity,
            bounds: Some(bounds.to_string()),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::PressStart { .. } => "PressStart",
            Event::Hold { .. } => "Hold",
            Event::LongPress { .. } => "LongPress",
            Event::Press { .. } => "Press",
            Event::ZoomComplete { .. } => "ZoomComplete",
            Event::Message(_) => "Message",
        }
    }

    pub fn activity(&self) -> Option<Activity> {
        match self {
            Event::Message(m) => Some(m.activity),
            _ => None,
        }
    }
}

/// Sending half of the notification stream. A dropped receiver is not an error.
#[derive(Clone)]
pub struct Emitter {
    tx: Sender<Event>,
}

impl Emitter {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: Event) {
        debug!("emit {}", event.name());
        if self.tx.send(event).is_err() {
            trace!("notification receiver gone");
        }
    }
}
