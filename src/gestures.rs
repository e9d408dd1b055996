use crate::camera::CameraHandle;
use crate::event::{Emitter, Event};
use crate::focus::{FocusController, FocusIndicator};
use crate::haptic::Haptic;
use crate::scheduler::{Scheduler, TimerToken};
use crate::tracker::{TouchAction, TouchSample};
use crate::zoom::{ZoomController, ZoomState};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};

pub const HOLD_MS: u64 = 750;
pub const HAPTIC_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    PressPending,
    Pinching,
    Resolved,
}

/// Posted by timers and autofocus callbacks; consumed by
/// [`GestureClassifier::pump`] on the gesture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Hold { press: u64 },
    AutoFocus { request: u64, success: bool },
    Settle { cycle: u64 },
}

/// Where controllers send notifications and signals.
#[derive(Clone)]
pub struct Outlet {
    events: Emitter,
    signals: Sender<Signal>,
}

impl Outlet {
    pub fn new(events: Sender<Event>, signals: Sender<Signal>) -> Self {
        Self {
            events: Emitter::new(events),
            signals,
        }
    }

    pub fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    pub(crate) fn signals(&self) -> Sender<Signal> {
        self.signals.clone()
    }
}

#[derive(Debug, Clone, Copy)]
struct Press {
    id: u64,
    start_ms: u64,
    x: f32,
    y: f32,
    hold_timer: Option<TimerToken>,
    hold_fired: bool,
}

pub struct GestureClassifier {
    camera: Option<Box<dyn CameraHandle>>,
    scheduler: Box<dyn Scheduler>,
    haptic: Box<dyn Haptic>,
    out: Outlet,
    signals: Receiver<Signal>,
    zoom: ZoomController,
    focus: FocusController,
    state: GestureState,
    pointers: usize,
    press: Option<Press>,
    next_press: u64,
    spacing: f32,
    alive: bool,
}

impl GestureClassifier {
    pub fn new(
        camera: Option<Box<dyn CameraHandle>>,
        scheduler: Box<dyn Scheduler>,
        haptic: Box<dyn Haptic>,
        events: Sender<Event>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        if camera.is_none() {
            warn!("no camera bound; zoom and focus are disabled");
        }
        Self {
            camera,
            scheduler,
            haptic,
            out: Outlet::new(events, tx),
            signals: rx,
            zoom: ZoomController::new(),
            focus: FocusController::new(),
            state: GestureState::Idle,
            pointers: 0,
            press: None,
            next_press: 0,
            spacing: 0.0,
            alive: true,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn focus(&self) -> FocusIndicator {
        self.focus.indicator()
    }

    pub fn zoom(&self) -> Option<ZoomState> {
        self.zoom.state()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn on_touch(&mut self, sample: &TouchSample) -> bool {
        if !self.alive {
            return false;
        }
        let n = sample.pointer_count;
        let handled = match sample.action {
            TouchAction::Down if n == 1 => self.on_down(sample),
            TouchAction::PointerDown if n >= 2 => self.on_pointer_down(sample),
            TouchAction::Move if n >= 2 && self.state == GestureState::Pinching => {
                self.on_pinch_move(sample)
            }
            TouchAction::Up if n == 1 => self.on_up(sample),
            TouchAction::Up if n >= 2 => {
                if self.state == GestureState::Pinching {
                    debug!("pointer lifted; pinch resolved");
                    self.state = GestureState::Resolved;
                }
                false
            }
            _ => false,
        };
        self.pointers = match sample.action {
            TouchAction::Up if n <= 1 => 0,
            TouchAction::Up => n - 1,
            _ => n,
        };
        handled
    }

    fn on_down(&mut self, sample: &TouchSample) -> bool {
        self.cancel_hold_timer();
        self.next_press += 1;
        let id = self.next_press;
        let (x, y) = (sample.x(), sample.y());

        let signals = self.out.signals();
        let hold_timer = self.scheduler.schedule(
            HOLD_MS,
            Box::new(move || {
                let _ = signals.send(Signal::Hold { press: id });
            }),
        );
        self.press = Some(Press {
            id,
            start_ms: sample.timestamp_ms,
            x,
            y,
            hold_timer: Some(hold_timer),
            hold_fired: false,
        });
        self.state = GestureState::PressPending;
        debug!("press {id} started at ({x:.1}, {y:.1})");
        self.out.emit(Event::PressStart { x, y });
        true
    }

    fn on_pointer_down(&mut self, sample: &TouchSample) -> bool {
        // a second finger turns any press into a pinch
        self.cancel_hold_timer();
        self.spacing = sample.spacing();
        self.state = GestureState::Pinching;
        debug!("pinch started, spacing {:.1}", self.spacing);
        self.camera.is_some()
    }

    fn on_pinch_move(&mut self, sample: &TouchSample) -> bool {
        let Some(camera) = self.camera.as_mut() else {
            return false;
        };
        if !camera.is_zoom_supported() {
            return false;
        }
        let spacing = sample.spacing();
        let previous = std::mem::replace(&mut self.spacing, spacing);
        match self.zoom.step(spacing, previous, &mut **camera) {
            Ok(z) => {
                self.out.emit(Event::ZoomComplete {
                    current: z.current,
                    max: z.max,
                });
                true
            }
            Err(e) => {
                warn!("zoom step failed: {e}");
                false
            }
        }
    }

    fn on_up(&mut self, sample: &TouchSample) -> bool {
        self.cancel_hold_timer();
        let was = std::mem::replace(&mut self.state, GestureState::Idle);
        let press = self.press.take();
        let Some(press) = press.filter(|_| was == GestureState::PressPending) else {
            debug!("gesture ended from {was:?}");
            return false;
        };

        let (x, y) = (sample.x(), sample.y());
        let elapsed = sample.timestamp_ms.saturating_sub(press.start_ms);
        if press.hold_fired || elapsed >= HOLD_MS {
            debug!("press {} released after {elapsed}ms: long press", press.id);
            self.out.emit(Event::LongPress { x, y });
            return true;
        }

        debug!("press {} released after {elapsed}ms: tap", press.id);
        self.out.emit(Event::Press { x, y });
        let Some(camera) = self.camera.as_mut() else {
            return false;
        };
        if let Err(e) = self
            .focus
            .begin(x, y, &mut **camera, self.scheduler.as_mut(), &self.out)
        {
            debug!("tap ignored for focus: {e}");
        }
        true
    }

    fn cancel_hold_timer(&mut self) {
        if let Some(token) = self.press.as_mut().and_then(|p| p.hold_timer.take()) {
            self.scheduler.cancel(token);
        }
    }

    /// Apply every signal queued by timers and camera callbacks. Must run on
    /// the thread that feeds [`GestureClassifier::on_touch`].
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(signal) = self.signals.try_recv() {
            if self.alive && self.dispatch(signal) {
                applied += 1;
            }
        }
        applied
    }

    fn dispatch(&mut self, signal: Signal) -> bool {
        match signal {
            Signal::Hold { press } => self.on_hold(press),
            Signal::AutoFocus { request, success } => {
                self.focus
                    .on_result(request, success, self.scheduler.as_mut(), &self.out)
            }
            Signal::Settle { cycle } => self.focus.on_settle(cycle, &self.out),
        }
    }

    fn on_hold(&mut self, id: u64) -> bool {
        let single = self.pointers == 1 && self.state == GestureState::PressPending;
        let Some(press) = self.press.as_mut().filter(|p| p.id == id) else {
            return false;
        };
        press.hold_timer = None;
        if !single || press.hold_fired {
            return false;
        }
        press.hold_fired = true;
        let (x, y) = (press.x, press.y);
        debug!("press {id} held");
        self.out.emit(Event::Hold { x, y });
        self.haptic.vibrate(HAPTIC_MS);
        true
    }

    /// Surface (re)created: bind the camera and start from a clean slate.
    pub fn surface_created(&mut self, camera: Option<Box<dyn CameraHandle>>) {
        if self.alive {
            self.surface_destroyed();
        }
        info!("surface created (camera: {})", camera.is_some());
        self.camera = camera;
        self.zoom = ZoomController::new();
        self.state = GestureState::Idle;
        self.pointers = 0;
        self.alive = true;
    }

    pub fn surface_changed(&mut self, width: u32, height: u32) {
        info!("surface changed to {width}x{height}");
    }

    /// Cancel every outstanding timer and autofocus request and release the
    /// camera. Nothing is emitted afterwards until the surface is recreated.
    pub fn surface_destroyed(&mut self) {
        if !self.alive {
            return;
        }
        self.cancel_hold_timer();
        if self.focus.teardown(self.scheduler.as_mut()) {
            if let Some(camera) = self.camera.as_mut() {
                camera.cancel_auto_focus();
            }
        }
        self.camera = None;
        self.press = None;
        self.state = GestureState::Idle;
        self.pointers = 0;
        self.alive = false;
        // anything already queued belongs to the old surface
        let dropped = self.signals.try_iter().count();
        info!("surface destroyed ({dropped} pending signal(s) dropped)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AutoFocusBehavior, SimCamera};
    use crate::event::{Activity, FocusBounds};
    use crate::focus::{FocusColor, FocusState, SETTLE_MS};
    use crate::scheduler::ManualClock;
    use crate::tracker::Point;
    use std::{cell::Cell, rc::Rc};

    struct Rig {
        cls: GestureClassifier,
        clock: ManualClock,
        camera: SimCamera,
        events: Receiver<Event>,
        buzzes: Rc<Cell<usize>>,
    }

    fn rig_with(camera: Option<SimCamera>) -> Rig {
        let clock = ManualClock::new();
        let (tx, events) = mpsc::channel();
        let buzzes = Rc::new(Cell::new(0));
        let counter = buzzes.clone();
        let sim = camera.clone().unwrap_or_else(|| SimCamera::new(0, 0, false));
        let cls = GestureClassifier::new(
            camera.map(|c| Box::new(c) as Box<dyn CameraHandle>),
            Box::new(clock.clone()),
            Box::new(move |_ms: u64| counter.set(counter.get() + 1)),
            tx,
        );
        Rig {
            cls,
            clock,
            camera: sim,
            events,
            buzzes,
        }
    }

    fn rig() -> Rig {
        rig_with(Some(SimCamera::new(5, 10, true)))
    }

    impl Rig {
        fn at(&mut self, t_ms: u64) {
            self.clock.advance_to(t_ms);
            self.cls.pump();
        }

        fn down(&mut self, x: f32, y: f32, t: u64) -> bool {
            self.at(t);
            self.cls
                .on_touch(&TouchSample::single(TouchAction::Down, x, y, t))
        }

        fn up(&mut self, x: f32, y: f32, t: u64) -> bool {
            self.at(t);
            self.cls.on_touch(&TouchSample::single(TouchAction::Up, x, y, t))
        }

        fn pair(&mut self, action: TouchAction, spacing: f32, t: u64) -> bool {
            self.at(t);
            let s = TouchSample::pair(
                action,
                Point::new(100.0, 100.0),
                Point::new(100.0 + spacing, 100.0),
                t,
            );
            self.cls.on_touch(&s)
        }

        fn drain(&self) -> Vec<Event> {
            self.events.try_iter().collect()
        }

        fn names(&self) -> Vec<&'static str> {
            self.drain().iter().map(Event::name).collect()
        }
    }

    #[test]
    fn quick_tap_emits_press_and_focuses() {
        let mut r = rig();
        assert!(r.down(120.0, 200.0, 0));
        assert_eq!(r.cls.state(), GestureState::PressPending);
        assert!(r.up(120.0, 200.0, 90));
        assert_eq!(r.cls.state(), GestureState::Idle);

        let events = r.drain();
        assert_eq!(
            events,
            vec![
                Event::PressStart { x: 120.0, y: 200.0 },
                Event::Press { x: 120.0, y: 200.0 },
                Event::message_with_bounds(Activity::Active, FocusBounds::around(120, 200, 50)),
            ]
        );
        assert_eq!(r.camera.auto_focus_requests(), 1);
        assert_eq!(r.cls.focus().state, FocusState::Active);
    }

    #[test]
    fn hold_fires_once_at_threshold_and_release_is_long_press() {
        let mut r = rig();
        r.down(10.0, 20.0, 0);
        r.at(HOLD_MS - 1);
        assert_eq!(r.names(), vec!["PressStart"]);

        r.at(HOLD_MS);
        assert_eq!(r.drain(), vec![Event::Hold { x: 10.0, y: 20.0 }]);
        assert_eq!(r.buzzes.get(), 1);

        assert!(r.up(12.0, 22.0, 800));
        assert_eq!(r.drain(), vec![Event::LongPress { x: 12.0, y: 22.0 }]);
        assert_eq!(r.buzzes.get(), 1);
        assert_eq!(r.camera.auto_focus_requests(), 0);
    }

    #[test]
    fn late_release_without_timer_is_still_one_long_press() {
        let mut r = rig();
        r.down(0.0, 0.0, 0);
        // sample clock runs ahead of the scheduler: the timer has not fired yet
        assert!(r.cls.on_touch(&TouchSample::single(TouchAction::Up, 0.0, 0.0, 900)));
        r.at(2_000);
        assert_eq!(r.names(), vec!["PressStart", "LongPress"]);
        assert_eq!(r.buzzes.get(), 0);
    }

    #[test]
    fn release_cancels_hold_timer() {
        let mut r = rig();
        r.down(0.0, 0.0, 0);
        r.up(0.0, 0.0, 100);
        assert_eq!(r.clock.pending(), 0);
        r.at(5_000);
        assert!(!r.names().contains(&"Hold"));
        assert_eq!(r.buzzes.get(), 0);
    }

    #[test]
    fn second_finger_suppresses_hold_and_tap() {
        let mut r = rig();
        r.down(100.0, 100.0, 0);
        assert!(r.pair(TouchAction::PointerDown, 100.0, 50));
        assert_eq!(r.cls.state(), GestureState::Pinching);
        r.at(HOLD_MS + 100);
        assert!(!r.pair(TouchAction::Up, 100.0, 900));
        assert_eq!(r.cls.state(), GestureState::Resolved);
        assert!(!r.up(100.0, 100.0, 950));
        assert_eq!(r.cls.state(), GestureState::Idle);

        assert_eq!(r.names(), vec!["PressStart"]);
        assert_eq!(r.buzzes.get(), 0);
        assert_eq!(r.camera.auto_focus_requests(), 0);
    }

    #[test]
    fn pinch_out_steps_zoom_up() {
        let mut r = rig();
        r.down(100.0, 100.0, 0);
        r.pair(TouchAction::PointerDown, 100.0, 10);
        assert!(r.pair(TouchAction::Move, 150.0, 20));
        let events = r.drain();
        assert_eq!(
            events.last(),
            Some(&Event::ZoomComplete { current: 6, max: 10 })
        );
        assert_eq!(r.cls.zoom(), Some(ZoomState { current: 6, max: 10 }));
    }

    #[test]
    fn pinch_moves_one_step_each_and_stays_in_range() {
        let mut r = rig_with(Some(SimCamera::new(1, 3, true)));
        r.down(100.0, 100.0, 0);
        r.pair(TouchAction::PointerDown, 100.0, 10);
        let spacings = [120.0, 140.0, 160.0, 180.0, 170.0, 160.0, 150.0, 140.0, 130.0, 130.0];
        let mut t = 20;
        for s in spacings {
            r.pair(TouchAction::Move, s, t);
            t += 10;
        }
        let zooms: Vec<i32> = r
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                Event::ZoomComplete { current, .. } => Some(current),
                _ => None,
            })
            .collect();
        assert_eq!(zooms, vec![2, 3, 3, 3, 2, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn pinch_without_zoom_support_is_passed_through() {
        let mut r = rig_with(Some(SimCamera::new(0, 0, false)));
        r.down(100.0, 100.0, 0);
        r.pair(TouchAction::PointerDown, 100.0, 10);
        assert!(!r.pair(TouchAction::Move, 150.0, 20));
        assert!(!r.names().contains(&"ZoomComplete"));
    }

    #[test]
    fn single_finger_move_is_ignored() {
        let mut r = rig();
        r.down(0.0, 0.0, 0);
        let moved = TouchSample::single(TouchAction::Move, 5.0, 5.0, 10);
        assert!(!r.cls.on_touch(&moved));
        assert_eq!(r.cls.state(), GestureState::PressPending);
    }

    #[test]
    fn down_reporting_several_pointers_is_not_a_press() {
        let mut r = rig();
        let s = TouchSample::single(TouchAction::Down, 5.0, 5.0, 0).with_pointer_count(2);
        assert!(!r.cls.on_touch(&s));
        assert_eq!(r.cls.state(), GestureState::Idle);
        assert!(r.names().is_empty());
    }

    #[test]
    fn pinch_at_max_zoom_stays_clamped() {
        let mut r = rig_with(Some(SimCamera::new(i32::MAX, i32::MAX, true)));
        r.down(100.0, 100.0, 0);
        r.pair(TouchAction::PointerDown, 100.0, 10);
        assert!(r.pair(TouchAction::Move, 150.0, 20));
        assert_eq!(
            r.cls.zoom(),
            Some(ZoomState {
                current: i32::MAX,
                max: i32::MAX
            })
        );
    }

    #[test]
    fn pinch_leaves_running_focus_cycle_alone() {
        let mut r = rig();
        r.down(10.0, 10.0, 0);
        r.up(10.0, 10.0, 50);
        r.down(100.0, 100.0, 100);
        r.pair(TouchAction::PointerDown, 100.0, 110);
        assert!(r.pair(TouchAction::Move, 150.0, 120));

        assert_eq!(r.camera.auto_focus_cancels(), 0);
        assert_eq!(r.cls.focus().state, FocusState::Active);
        assert!(r.camera.complete_auto_focus(true));
        r.at(130);
        assert_eq!(r.cls.focus().state, FocusState::Success);
    }

    #[test]
    fn tap_far_outside_i32_range_saturates_bounds() {
        let mut r = rig();
        r.down(3.0e9, 10.0, 0);
        assert!(r.up(3.0e9, 10.0, 50));
        let b = r.cls.focus().bounds.unwrap();
        assert_eq!((b.left, b.right), (i32::MAX - 50, i32::MAX));
        assert_eq!((b.top, b.bottom), (-40, 60));
    }

    #[test]
    fn failed_focus_runs_full_cycle_with_colors() {
        let mut r = rig();
        r.down(50.0, 50.0, 0);
        r.up(50.0, 50.0, 40);
        assert_eq!(r.cls.focus().color, FocusColor::Neutral);

        r.camera.complete_auto_focus(false);
        r.at(100);
        assert_eq!(r.cls.focus().color, FocusColor::Negative);

        r.at(100 + SETTLE_MS - 1);
        assert_eq!(r.cls.focus().state, FocusState::Failed);
        r.at(100 + SETTLE_MS);
        assert_eq!(r.cls.focus().color, FocusColor::Transparent);
        assert_eq!(r.cls.focus().bounds, None);

        let activities: Vec<Activity> = r.drain().iter().filter_map(Event::activity).collect();
        assert_eq!(
            activities,
            vec![
                Activity::Active,
                Activity::Focus,
                Activity::Failed,
                Activity::Complete
            ]
        );
    }

    #[test]
    fn tap_during_focus_cycle_is_rejected() {
        let mut r = rig();
        r.down(10.0, 10.0, 0);
        r.up(10.0, 10.0, 50);
        r.down(300.0, 300.0, 100);
        assert!(r.up(300.0, 300.0, 150));

        assert_eq!(
            r.names(),
            vec!["PressStart", "Press", "Message", "PressStart", "Press"]
        );
        assert_eq!(r.camera.auto_focus_requests(), 1);
        assert_eq!(r.cls.focus().bounds, Some(FocusBounds::around(10, 10, 50)));
    }

    #[test]
    fn rejected_autofocus_fails_locally() {
        let cam = SimCamera::new(0, 0, false).with_behavior(AutoFocusBehavior::Reject);
        let mut r = rig_with(Some(cam));
        r.down(10.0, 10.0, 0);
        assert!(r.up(10.0, 10.0, 50));
        r.at(50 + SETTLE_MS);
        let activities: Vec<Activity> = r.drain().iter().filter_map(Event::activity).collect();
        assert_eq!(
            activities,
            vec![
                Activity::Active,
                Activity::Focus,
                Activity::Failed,
                Activity::Complete
            ]
        );
    }

    #[test]
    fn without_camera_only_press_notifications_fire() {
        let mut r = rig_with(None);
        assert!(r.down(10.0, 10.0, 0));
        assert!(!r.up(10.0, 10.0, 50));
        r.down(10.0, 10.0, 100);
        assert!(!r.pair(TouchAction::PointerDown, 50.0, 110));
        assert!(!r.pair(TouchAction::Move, 80.0, 120));
        r.up(10.0, 10.0, 130);
        r.down(10.0, 10.0, 200);
        assert!(r.up(10.0, 10.0, 1_000));
        assert_eq!(
            r.names(),
            vec![
                "PressStart",
                "Press",
                "PressStart",
                "PressStart",
                "Hold",
                "LongPress"
            ]
        );
    }

    #[test]
    fn teardown_silences_pending_timers_and_callbacks() {
        let mut r = rig();
        r.down(10.0, 10.0, 0);
        r.up(10.0, 10.0, 50);
        r.down(10.0, 10.0, 100);
        let _ = r.drain();

        r.cls.surface_destroyed();
        assert!(!r.cls.is_alive());
        assert_eq!(r.camera.auto_focus_cancels(), 1);
        assert!(!r.camera.complete_auto_focus(true));
        r.at(5_000);
        assert!(r.drain().is_empty());
        assert_eq!(r.buzzes.get(), 0);
        assert!(!r.cls.on_touch(&TouchSample::single(TouchAction::Down, 1.0, 1.0, 5_000)));
        assert_eq!(r.cls.focus().state, FocusState::Inactive);
    }

    #[test]
    fn callback_delivered_before_teardown_is_discarded() {
        let mut r = rig();
        r.down(10.0, 10.0, 0);
        r.up(10.0, 10.0, 50);
        // result queued but not yet pumped
        r.camera.complete_auto_focus(true);
        r.cls.surface_destroyed();
        assert_eq!(r.cls.pump(), 0);
        let _ = r.drain();

        r.cls
            .surface_created(Some(Box::new(r.camera.clone()) as Box<dyn CameraHandle>));
        assert!(r.cls.is_alive());
        r.at(1_000);
        assert!(r.drain().is_empty());
        assert!(r.down(10.0, 10.0, 1_000));
        assert!(r.up(10.0, 10.0, 1_050));
        assert_eq!(r.names(), vec!["PressStart", "Press", "Message"]);
        assert_eq!(r.camera.auto_focus_requests(), 2);
    }
}
