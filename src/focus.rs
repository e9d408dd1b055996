//! Tap-to-focus cycle: Active, then Success or Failed, then back to Inactive
//! after the settle delay.

use crate::camera::CameraHandle;
use crate::event::{Activity, Event, FocusBounds};
use crate::gestures::{Outlet, Signal};
use crate::scheduler::{Scheduler, TimerToken};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

pub const SETTLE_MS: u64 = 200;
pub const FOCUS_HALF_EXTENT: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FocusState {
    Inactive,
    Active,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FocusColor {
    Transparent,
    Neutral,
    Positive,
    Negative,
}

impl FocusColor {
    pub fn rgba(self) -> [u8; 4] {
        match self {
            FocusColor::Transparent => [0, 0, 0, 0],
            FocusColor::Neutral => [200, 200, 200, 255],
            FocusColor::Positive => [100, 230, 100, 255],
            FocusColor::Negative => [230, 100, 100, 255],
        }
    }
}

impl FocusState {
    pub fn color(self) -> FocusColor {
        match self {
            FocusState::Inactive => FocusColor::Transparent,
            FocusState::Active => FocusColor::Neutral,
            FocusState::Success => FocusColor::Positive,
            FocusState::Failed => FocusColor::Negative,
        }
    }
}

/// What a renderer needs to draw the focus rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FocusIndicator {
    pub state: FocusState,
    pub color: FocusColor,
    pub bounds: Option<FocusBounds>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FocusError {
    #[error("focus cycle already in progress ({0:?})")]
    Busy(FocusState),
}

#[derive(Debug)]
pub struct FocusController {
    state: FocusState,
    bounds: Option<FocusBounds>,
    next_request: u64,
    pending_request: Option<u64>,
    cycle: u64,
    settle: Option<TimerToken>,
}

impl Default for FocusController {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusController {
    pub fn new() -> Self {
        Self {
            state: FocusState::Inactive,
            bounds: None,
            next_request: 0,
            pending_request: None,
            cycle: 0,
            settle: None,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn bounds(&self) -> Option<FocusBounds> {
        self.bounds
    }

    pub fn indicator(&self) -> FocusIndicator {
        FocusIndicator {
            state: self.state,
            color: self.state.color(),
            bounds: self.bounds,
        }
    }

    /// Start a cycle at a tap position. A tap while a previous cycle has not
    /// returned to Inactive is rejected and leaves that cycle untouched.
    pub fn begin(
        &mut self,
        x: f32,
        y: f32,
        camera: &mut dyn CameraHandle,
        scheduler: &mut dyn Scheduler,
        out: &Outlet,
    ) -> Result<FocusBounds, FocusError> {
        if self.state != FocusState::Inactive {
            return Err(FocusError::Busy(self.state));
        }

        let bounds = FocusBounds::around(x as i32, y as i32, FOCUS_HALF_EXTENT);
        self.bounds = Some(bounds);
        self.state = FocusState::Active;
        self.cycle += 1;
        self.next_request += 1;
        let request = self.next_request;
        self.pending_request = Some(request);
        out.emit(Event::message_with_bounds(Activity::Active, bounds));
        debug!("focus cycle {} active at {bounds}", self.cycle);

        let signals = out.signals();
        let requested = camera.request_auto_focus(Box::new(move |success| {
            let _ = signals.send(Signal::AutoFocus { request, success });
        }));
        if let Err(e) = requested {
            warn!("autofocus request failed: {e}");
            self.resolve(false, scheduler, out);
        }
        Ok(bounds)
    }

    /// Apply an autofocus result. Results for anything but the outstanding
    /// request are ignored; returns whether this one was applied.
    pub(crate) fn on_result(
        &mut self,
        request: u64,
        success: bool,
        scheduler: &mut dyn Scheduler,
        out: &Outlet,
    ) -> bool {
        if self.pending_request != Some(request) || self.state != FocusState::Active {
            debug!("dropping stale autofocus result for request {request}");
            return false;
        }
        self.resolve(success, scheduler, out);
        true
    }

    fn resolve(&mut self, success: bool, scheduler: &mut dyn Scheduler, out: &Outlet) {
        self.pending_request = None;
        out.emit(Event::message(Activity::Focus));
        if success {
            self.state = FocusState::Success;
            out.emit(Event::message(Activity::Success));
        } else {
            self.state = FocusState::Failed;
            out.emit(Event::message(Activity::Failed));
        }
        info!("focus cycle {} resolved: {:?}", self.cycle, self.state);

        let cycle = self.cycle;
        let signals = out.signals();
        self.settle = Some(scheduler.schedule(
            SETTLE_MS,
            Box::new(move || {
                let _ = signals.send(Signal::Settle { cycle });
            }),
        ));
    }

    pub(crate) fn on_settle(&mut self, cycle: u64, out: &Outlet) -> bool {
        let settling = matches!(self.state, FocusState::Success | FocusState::Failed);
        if cycle != self.cycle || !settling {
            return false;
        }
        self.settle = None;
        self.state = FocusState::Inactive;
        self.bounds = None;
        out.emit(Event::message(Activity::Complete));
        true
    }

    /// Drop the current cycle without notifying anyone. Returns true if an
    /// autofocus request was still outstanding and should be cancelled.
    pub(crate) fn teardown(&mut self, scheduler: &mut dyn Scheduler) -> bool {
        if let Some(token) = self.settle.take() {
            scheduler.cancel(token);
        }
        // bumping the cycle also invalidates any settle signal already queued
        self.cycle += 1;
        self.state = FocusState::Inactive;
        self.bounds = None;
        self.pending_request.take().is_some()
    }
}
