pub mod camera;
pub mod config;
pub mod event;
pub mod focus;
pub mod gestures;
pub mod haptic;
pub mod input;
pub mod logging;
pub mod scheduler;
pub mod script;
pub mod tracker;
pub mod zoom;
