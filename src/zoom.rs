use crate::camera::{CameraError, CameraHandle};
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomState {
    pub current: i32,
    pub max: i32,
}

/// One zoom step per pinch sample, in the direction of the spacing change.
#[derive(Debug, Default)]
pub struct ZoomController {
    last: Option<ZoomState>,
}

impl ZoomController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last state mirrored from the camera, if any step has run.
    pub fn state(&self) -> Option<ZoomState> {
        self.last
    }

    pub fn step(
        &mut self,
        new_spacing: f32,
        old_spacing: f32,
        camera: &mut dyn CameraHandle,
    ) -> Result<ZoomState, CameraError> {
        let max = camera.max_zoom().max(0);
        let current = camera.zoom().clamp(0, max);
        let next = match new_spacing.partial_cmp(&old_spacing) {
            Some(Ordering::Greater) => current.saturating_add(1).min(max),
            Some(Ordering::Less) => current.saturating_sub(1).max(0),
            _ => current,
        };

        camera.set_zoom(next)?;

        // the device is authoritative; mirror whatever it settled on
        let max = camera.max_zoom().max(0);
        let state = ZoomState {
            current: camera.zoom().clamp(0, max),
            max,
        };
        debug!(
            "zoom {current} -> {}/{} (spacing {old_spacing:.1} -> {new_spacing:.1})",
            state.current, state.max
        );
        self.last = Some(state);
        Ok(state)
    }
}
