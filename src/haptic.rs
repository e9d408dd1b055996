use log::debug;

/// Fire-and-forget vibration. Implementations swallow their own failures.
pub trait Haptic {
    fn vibrate(&mut self, duration_ms: u64);
}

impl<F: FnMut(u64)> Haptic for F {
    fn vibrate(&mut self, duration_ms: u64) {
        self(duration_ms)
    }
}

/// Hosts without a vibrator just log the request.
#[derive(Debug, Default)]
pub struct LogHaptic;

impl Haptic for LogHaptic {
    fn vibrate(&mut self, duration_ms: u64) {
        debug!("haptic: vibrate {duration_ms}ms");
    }
}
