//! Camera collaborator interface and an in-memory simulated device.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};
use thiserror::Error;

/// Invoked exactly once with the autofocus outcome, from any thread.
pub type AutoFocusCallback = Box<dyn FnOnce(bool) + Send>;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("autofocus request rejected: {0}")]
    Rejected(String),
    #[error("invalid camera parameter: {0}")]
    Parameter(String),
}

pub trait CameraHandle {
    fn zoom(&self) -> i32;
    fn max_zoom(&self) -> i32;
    fn is_zoom_supported(&self) -> bool;
    fn set_zoom(&mut self, zoom: i32) -> Result<(), CameraError>;
    fn request_auto_focus(&mut self, callback: AutoFocusCallback) -> Result<(), CameraError>;
    fn cancel_auto_focus(&mut self);
}

/// How [`SimCamera`] answers autofocus requests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoFocusBehavior {
    /// Callback runs synchronously with `true`.
    Success,
    /// Callback runs synchronously with `false`.
    Failure,
    /// The request itself returns an error.
    Reject,
    /// Callbacks queue until [`SimCamera::complete_auto_focus`].
    #[default]
    Manual,
}

#[derive(Default)]
struct SimState {
    zoom: i32,
    max_zoom: i32,
    zoom_supported: bool,
    behavior: AutoFocusBehavior,
    latency_ms: u64,
    pending: VecDeque<AutoFocusCallback>,
    requests: usize,
    cancels: usize,
}

/// Shared handle to a simulated camera; clones observe the same device.
#[derive(Clone)]
pub struct SimCamera {
    inner: Arc<Mutex<SimState>>,
}

impl SimCamera {
    pub fn new(zoom: i32, max_zoom: i32, zoom_supported: bool) -> Self {
        let max_zoom = max_zoom.max(0);
        Self {
            inner: Arc::new(Mutex::new(SimState {
                zoom: zoom.clamp(0, max_zoom),
                max_zoom,
                zoom_supported,
                ..SimState::default()
            })),
        }
    }

    pub fn with_behavior(self, behavior: AutoFocusBehavior) -> Self {
        self.state().behavior = behavior;
        self
    }

    /// Success/failure results are delivered from a background thread after
    /// `latency_ms` instead of synchronously. Zero keeps them synchronous.
    pub fn with_latency(self, latency_ms: u64) -> Self {
        self.state().latency_ms = latency_ms;
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the oldest queued request. Returns false if none was queued.
    pub fn complete_auto_focus(&self, success: bool) -> bool {
        // the callback must run without the lock held
        let cb = self.state().pending.pop_front();
        match cb {
            Some(cb) => {
                cb(success);
                true
            }
            None => false,
        }
    }

    pub fn pending_auto_focus(&self) -> usize {
        self.state().pending.len()
    }

    pub fn auto_focus_requests(&self) -> usize {
        self.state().requests
    }

    pub fn auto_focus_cancels(&self) -> usize {
        self.state().cancels
    }
}

impl CameraHandle for SimCamera {
    fn zoom(&self) -> i32 {
        self.state().zoom
    }

    fn max_zoom(&self) -> i32 {
        self.state().max_zoom
    }

    fn is_zoom_supported(&self) -> bool {
        self.state().zoom_supported
    }

    fn set_zoom(&mut self, zoom: i32) -> Result<(), CameraError> {
        let mut st = self.state();
        if !st.zoom_supported {
            return Err(CameraError::Parameter("zoom not supported".into()));
        }
        st.zoom = zoom.clamp(0, st.max_zoom);
        debug!("sim camera: zoom {}/{}", st.zoom, st.max_zoom);
        Ok(())
    }

    fn request_auto_focus(&mut self, callback: AutoFocusCallback) -> Result<(), CameraError> {
        let (behavior, latency_ms) = {
            let mut st = self.state();
            st.requests += 1;
            (st.behavior, st.latency_ms)
        };
        let success = match behavior {
            AutoFocusBehavior::Reject => {
                return Err(CameraError::Rejected("simulated rejection".into()));
            }
            AutoFocusBehavior::Manual => {
                self.state().pending.push_back(callback);
                return Ok(());
            }
            AutoFocusBehavior::Success => true,
            AutoFocusBehavior::Failure => false,
        };
        if latency_ms == 0 {
            callback(success);
        } else {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(latency_ms));
                callback(success);
            });
        }
        Ok(())
    }

    fn cancel_auto_focus(&mut self) {
        let mut st = self.state();
        st.cancels += 1;
        let dropped = st.pending.len();
        st.pending.clear();
        if dropped > 0 {
            info!("sim camera: cancelled {dropped} pending autofocus request(s)");
        }
    }
}
