use anyhow::{Result, anyhow};
use camtouch::{
    config::{CameraProfile, ConfigState},
    haptic::LogHaptic,
    input,
    script::{self, Script},
};
use log::warn;
use pico_args::Arguments;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    env,
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("replay") => {
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: camtouch replay <script.toml>"))?;
            let script = Script::load(&path)?;
            let base = match ConfigState::load_or_install_default() {
                Ok(cfg) => cfg.settings.camera,
                Err(e) => {
                    warn!("settings unavailable ({e}); using built-in camera profile");
                    CameraProfile::default()
                }
            };
            for ev in script::replay(&script, &base, Box::new(LogHaptic)) {
                println!("{}", ev.to_json());
            }
            Ok(())
        }

        Some("live") => {
            let device: Option<String> = pargs.opt_value_from_str("--device")?;
            let mut cfg = ConfigState::load_or_install_default()?;
            if device.is_some() {
                cfg.settings.input.device = device;
            }

            let stop = Arc::new(AtomicBool::new(false));
            signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
            signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;
            input::run_live(&cfg.settings, stop)
        }

        Some("devices") => {
            let devs = input::discover_multitouch();
            if devs.is_empty() {
                println!("no multitouch devices detected (check read access to /dev/input)");
            }
            for d in devs {
                println!("{}\t{}", d.path, d.name);
            }
            Ok(())
        }

        Some("config") => {
            let cfg = ConfigState::load_or_install_default()?;
            print_response(&cfg.report());
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"camtouch: camera preview touch gestures

USAGE:
  camtouch help [command]              Show general or command-specific help
  camtouch replay <script.toml>        Replay a scripted touch session
  camtouch live [--device <path>]      Classify gestures from a touchscreen
  camtouch devices                     List detected multitouch devices
  camtouch config                      Show the active settings

TIPS:
  - Settings: ~/.config/camtouch/settings.toml
  - Log level: CAMTOUCH_LOG=debug
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "replay" => println!(
            "usage: camtouch replay <script.toml>\nRuns the script on a virtual clock and prints one JSON line per notification."
        ),
        "live" => println!(
            "usage: camtouch live [--device <path>]\nReads a touchscreen until SIGINT/SIGTERM against the simulated camera from settings."
        ),
        "devices" => println!("usage: camtouch devices\nLists /dev/input devices with multitouch axes."),
        "config" => println!(
            "usage: camtouch config\nPrints the settings path and contents; installs defaults if missing."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
