//! Multitouch device discovery and the live session loop (evdev 0.13).

use crate::config::Settings;
use crate::gestures::GestureClassifier;
use crate::haptic::LogHaptic;
use crate::scheduler::ThreadScheduler;
use crate::script::TimedEvent;
use crate::tracker::Tracker;
use anyhow::{Result, anyhow};
use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};
use log::{debug, info, warn};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

fn is_multitouch(dev: &Device) -> bool {
    if !dev.supported_events().contains(EventType::ABSOLUTE) {
        return false;
    }
    dev.supported_absolute_axes().is_some_and(|axes| {
        [
            AbsoluteAxisCode::ABS_MT_SLOT,
            AbsoluteAxisCode::ABS_MT_TRACKING_ID,
            AbsoluteAxisCode::ABS_MT_POSITION_X,
            AbsoluteAxisCode::ABS_MT_POSITION_Y,
        ]
        .into_iter()
        .all(|code| axes.contains(code))
    })
}

/// Readable `/dev/input/event*` nodes that report MT slots, sorted by path.
pub fn discover_multitouch() -> Vec<DeviceInfo> {
    let Ok(entries) = std::fs::read_dir("/dev/input") else {
        return vec![];
    };
    let mut out: Vec<DeviceInfo> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("event"))
        })
        .filter_map(|p| match Device::open(&p) {
            Ok(dev) if is_multitouch(&dev) => Some(DeviceInfo {
                path: p.display().to_string(),
                name: dev.name().unwrap_or("unknown").to_string(),
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("skipping {}: {e}", p.display());
                None
            }
        })
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn open_device(settings: &Settings) -> Result<Device> {
    let path = match &settings.input.device {
        Some(p) => p.clone(),
        None => discover_multitouch()
            .into_iter()
            .next()
            .map(|d| d.path)
            .ok_or_else(|| anyhow!("no multitouch devices detected"))?,
    };
    let dev = Device::open(&path).map_err(|e| anyhow!("failed to open {path}: {e}"))?;
    dev.set_nonblocking(true)?;
    info!(
        "live: reading {} ({path})",
        dev.name().unwrap_or("unknown")
    );
    Ok(dev)
}

/// Drive a classifier from a touchscreen until `stop` is raised, printing
/// each notification as a JSON line. The surface is torn down on exit.
pub fn run_live(settings: &Settings, stop: Arc<AtomicBool>) -> Result<()> {
    let mut dev = open_device(settings)?;

    let (width, height) = (settings.input.surface_width, settings.input.surface_height);
    let mut tracker = Tracker::new();
    tracker.set_surface_size(width, height);
    match dev.get_abs_state() {
        Ok(abs) => {
            let x = abs[AbsoluteAxisCode::ABS_MT_POSITION_X.0 as usize];
            let y = abs[AbsoluteAxisCode::ABS_MT_POSITION_Y.0 as usize];
            tracker.set_norm_ranges(x.minimum, x.maximum, y.minimum, y.maximum);
        }
        Err(e) => warn!("live: no axis ranges ({e}); assuming 0..4096"),
    }

    let (tx, rx) = mpsc::channel();
    let mut cls = GestureClassifier::new(
        Some(Box::new(settings.camera.build())),
        Box::new(ThreadScheduler::new()),
        Box::new(LogHaptic),
        tx,
    );
    cls.surface_changed(width, height);

    while !stop.load(Ordering::Relaxed) {
        let mut any_event = false;
        if let Ok(events) = dev.fetch_events() {
            for ev in events {
                any_event = true;
                if ev.event_type() == EventType::ABSOLUTE {
                    match ev.code() {
                        c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => tracker.on_slot(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                            tracker.on_tracking_id(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => {
                            tracker.on_pos_x(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                            tracker.on_pos_y(ev.value())
                        }
                        _ => {}
                    }
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    for sample in tracker.on_syn_report() {
                        cls.on_touch(&sample);
                    }
                }
            }
        }

        cls.pump();
        let t_ms = tracker.now_ms();
        for event in rx.try_iter() {
            println!("{}", TimedEvent { t_ms, event }.to_json());
        }

        if !any_event {
            thread::sleep(Duration::from_millis(4));
        }
    }

    cls.surface_destroyed();
    info!("live: stopped");
    Ok(())
}
