//! Replay of scripted touch sessions against a simulated camera on a virtual
//! clock.

use crate::camera::{AutoFocusBehavior, CameraHandle, SimCamera};
use crate::config::{CameraProfile, validate_camera};
use crate::event::Event;
use crate::gestures::GestureClassifier;
use crate::haptic::Haptic;
use crate::scheduler::{ManualClock, Scheduler};
use crate::tracker::{Point, TouchAction, TouchSample};
use anyhow::{Result, anyhow};
use log::{debug, warn};
use serde::Deserialize;
use std::{
    fs,
    path::Path,
    sync::mpsc::{self, Receiver},
};

const DEFAULT_DRAIN_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceStep {
    Created,
    Changed,
    Destroyed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub at_ms: u64,
    pub action: Option<TouchAction>,
    #[serde(default)]
    pub points: Vec<[f32; 2]>,
    /// Overrides the pointer count implied by `points`.
    pub pointers: Option<usize>,
    /// Resolve the oldest pending autofocus request.
    pub focus: Option<bool>,
    pub surface: Option<SurfaceStep>,
    pub size: Option<[u32; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub camera: Option<CameraProfile>,
    /// How long to keep the clock running after the last step.
    pub drain_ms: Option<u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// A notification stamped with the virtual time it was emitted at.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub t_ms: u64,
    pub event: Event,
}

impl TimedEvent {
    pub fn to_json(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(&self.event).unwrap_or_default();
        if let Some(obj) = v.as_object_mut() {
            obj.insert("t_ms".into(), self.t_ms.into());
        }
        v
    }
}

impl Script {
    pub fn parse(txt: &str) -> Result<Self> {
        let script: Script = toml::from_str(txt)?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        Self::parse(&txt).map_err(|e| anyhow!("invalid script {}: {e}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if let Some(c) = &self.camera {
            validate_camera(c)?;
        }
        let mut last = 0;
        for (i, s) in self.steps.iter().enumerate() {
            if s.at_ms < last {
                return Err(anyhow!("step {i}: at_ms goes backwards ({} < {last})", s.at_ms));
            }
            last = s.at_ms;

            let kinds = [s.action.is_some(), s.focus.is_some(), s.surface.is_some()];
            if kinds.iter().filter(|k| **k).count() != 1 {
                return Err(anyhow!(
                    "step {i}: exactly one of action, focus, surface is required"
                ));
            }
            if s.points.iter().flatten().any(|v| !v.is_finite()) {
                return Err(anyhow!("step {i}: point coordinates must be finite"));
            }
            if s.action.is_some() && s.points.is_empty() {
                return Err(anyhow!("step {i}: touch steps need at least one point"));
            }
            if s.surface == Some(SurfaceStep::Changed) && s.size.is_none() {
                return Err(anyhow!("step {i}: surface change needs size = [w, h]"));
            }
        }
        Ok(())
    }

    fn end_ms(&self) -> u64 {
        let last = self.steps.last().map_or(0, |s| s.at_ms);
        last + self.drain_ms.unwrap_or(DEFAULT_DRAIN_MS)
    }
}

struct Replay {
    clock: ManualClock,
    camera: SimCamera,
    cls: GestureClassifier,
    events: Receiver<Event>,
    out: Vec<TimedEvent>,
    // synchronous outcomes are re-timed on the virtual clock
    outcome: Option<bool>,
    latency_ms: u64,
    seen_requests: usize,
}

impl Replay {
    fn new(profile: &CameraProfile, haptic: Box<dyn Haptic>) -> Self {
        let outcome = match profile.autofocus {
            AutoFocusBehavior::Success => Some(true),
            AutoFocusBehavior::Failure => Some(false),
            AutoFocusBehavior::Reject | AutoFocusBehavior::Manual => None,
        };
        let behavior = if outcome.is_some() {
            AutoFocusBehavior::Manual
        } else {
            profile.autofocus
        };
        let camera = SimCamera::new(profile.zoom, profile.max_zoom, profile.zoom_supported)
            .with_behavior(behavior);
        let clock = ManualClock::new();
        let (tx, events) = mpsc::channel();
        let cls = GestureClassifier::new(
            Some(Box::new(camera.clone())),
            Box::new(clock.clone()),
            haptic,
            tx,
        );
        Self {
            clock,
            camera,
            cls,
            events,
            out: Vec::new(),
            outcome,
            latency_ms: profile.focus_latency_ms,
            seen_requests: 0,
        }
    }

    /// Run the clock up to `t_ms`, stopping at every deadline so signals are
    /// applied at the virtual time they were posted.
    fn run_until(&mut self, t_ms: u64) {
        while let Some(due) = self.clock.next_due().filter(|d| *d <= t_ms) {
            self.clock.advance_to(due);
            self.settle();
        }
        self.clock.advance_to(t_ms);
        self.settle();
    }

    fn settle(&mut self) {
        self.cls.pump();
        self.collect();
        let requests = self.camera.auto_focus_requests();
        if let Some(success) = self.outcome {
            for _ in self.seen_requests..requests {
                let camera = self.camera.clone();
                self.clock.schedule(
                    self.latency_ms,
                    Box::new(move || {
                        camera.complete_auto_focus(success);
                    }),
                );
            }
        }
        self.seen_requests = requests;
    }

    fn collect(&mut self) {
        let t_ms = self.clock.now_ms();
        self.out
            .extend(self.events.try_iter().map(|event| TimedEvent { t_ms, event }));
    }

    fn apply(&mut self, step: &Step) {
        if let Some(action) = step.action {
            let pts: Vec<Point> = step.points.iter().map(|p| Point::new(p[0], p[1])).collect();
            let sample = TouchSample {
                action,
                pointer_count: step.pointers.unwrap_or(pts.len()),
                points: [
                    pts.first().copied().unwrap_or_default(),
                    pts.get(1).copied().unwrap_or_default(),
                ],
                timestamp_ms: step.at_ms,
            };
            let handled = self.cls.on_touch(&sample);
            debug!("t={} {:?} x{} handled={handled}", step.at_ms, action, sample.pointer_count);
        } else if let Some(success) = step.focus {
            if !self.camera.complete_auto_focus(success) {
                warn!("t={}: no autofocus request pending", step.at_ms);
            }
        } else if let Some(surface) = step.surface {
            match surface {
                SurfaceStep::Created => {
                    let camera: Box<dyn CameraHandle> = Box::new(self.camera.clone());
                    self.cls.surface_created(Some(camera));
                }
                SurfaceStep::Changed => {
                    let [w, h] = step.size.unwrap_or_default();
                    self.cls.surface_changed(w, h);
                }
                SurfaceStep::Destroyed => self.cls.surface_destroyed(),
            }
        }
        self.settle();
    }
}

/// Replay a script; `base` is used when the script has no `[camera]` table.
pub fn replay(script: &Script, base: &CameraProfile, haptic: Box<dyn Haptic>) -> Vec<TimedEvent> {
    let profile = script.camera.as_ref().unwrap_or(base);
    let mut r = Replay::new(profile, haptic);
    for step in &script.steps {
        r.run_until(step.at_ms);
        r.apply(step);
    }
    r.run_until(script.end_ms());
    r.out
}
