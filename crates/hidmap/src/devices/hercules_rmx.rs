//! Hercules DJ Console RMX
//!
//! One 25-byte input report (id 1): 48 buttons packed into bytes 1-6, two jog
//! wheel positions in bytes 7-8 and 16 faders/knobs in bytes 9-24. The device
//! has no lamps we drive.
//!
//! Either `source` button acts as shift. Pressing the second one while the
//! first is held toggles the crossfader lock and centers the crossfader.

use crate::bindings::{
    Continuous, JogButton, RelativeJog, SetControl, SharedFlag, ToggleControl,
};
use crate::engine::Engine;
use crate::handler::{Context, ControlEvent};
use crate::layout::{ConfigError, ControlSpec, DeviceLayout};
use crate::surface::ControlSurface;
use crate::transport::ReportSink;
use crate::types::{ControlKind, TriggerMode};
use std::cell::Cell;
use std::rc::Rc;

pub const DEVICE_TYPE: &str = "hercules_rmx";
pub const DEVICE_NAME: &str = "Hercules DJ Console RMX";

/// Report ID of the only input report
pub const INPUT_REPORT_ID: u8 = 1;

/// Input report length including the report ID byte
pub const INPUT_REPORT_LEN: usize = 25;

const BEATJUMP_MIN: f64 = 0.125;
const BEATJUMP_MAX: f64 = 128.0;

/// Rate fader raw value that maps to the centre
const RATE_CENTER: u8 = 127;

const CH1: &str = "[Channel1]";
const CH2: &str = "[Channel2]";
const MASTER: &str = "[Master]";
const PLAYLIST: &str = "[Playlist]";

/// (name, group, kind, offset, mask)
#[rustfmt::skip]
const CONTROLS: &[(&str, &str, ControlKind, usize, u8)] = &[
    ("keypad1",           CH1,    ControlKind::Button,  1, 0x01),
    ("keypad2",           CH1,    ControlKind::Button,  1, 0x02),
    ("keypad3",           CH1,    ControlKind::Button,  1, 0x04),
    ("keypad4",           CH1,    ControlKind::Button,  1, 0x08),
    ("keypad5",           CH1,    ControlKind::Button,  1, 0x10),
    ("keypad6",           CH1,    ControlKind::Button,  1, 0x20),
    ("beatsync",          CH1,    ControlKind::Button,  1, 0x40),
    ("beatlock",          CH1,    ControlKind::Button,  1, 0x80),
    ("previous",          CH1,    ControlKind::Button,  2, 0x01),
    ("next",              CH1,    ControlKind::Button,  2, 0x02),
    ("play",              CH1,    ControlKind::Button,  2, 0x04),
    ("cue_default",       CH1,    ControlKind::Button,  2, 0x08),
    ("stop",              CH1,    ControlKind::Button,  2, 0x10),
    ("filterHighKill",    CH1,    ControlKind::Button,  2, 0x20),
    ("filterMidKill",     CH1,    ControlKind::Button,  2, 0x40),
    ("filterLowKill",     CH1,    ControlKind::Button,  2, 0x80),
    ("pitch_reset",       CH1,    ControlKind::Button,  3, 0x01),
    ("LoadSelectedTrack", CH1,    ControlKind::Button,  3, 0x02),
    ("source",            CH1,    ControlKind::Button,  3, 0x04),
    ("headphone_cue",     CH1,    ControlKind::Button,  3, 0x08),
    ("beatlock",          CH2,    ControlKind::Button,  3, 0x10),
    ("LoadSelectedTrack", CH2,    ControlKind::Button,  3, 0x20),
    ("source",            CH2,    ControlKind::Button,  3, 0x40),
    ("headphone_cue",     CH2,    ControlKind::Button,  3, 0x80),
    ("keypad1",           CH2,    ControlKind::Button,  4, 0x01),
    ("keypad2",           CH2,    ControlKind::Button,  4, 0x02),
    ("keypad3",           CH2,    ControlKind::Button,  4, 0x04),
    ("keypad4",           CH2,    ControlKind::Button,  4, 0x08),
    ("keypad5",           CH2,    ControlKind::Button,  4, 0x10),
    ("keypad6",           CH2,    ControlKind::Button,  4, 0x20),
    ("beatsync",          CH2,    ControlKind::Button,  4, 0x40),
    ("pitch_reset",       CH2,    ControlKind::Button,  4, 0x80),
    ("previous",          CH2,    ControlKind::Button,  5, 0x01),
    ("next",              CH2,    ControlKind::Button,  5, 0x02),
    ("play",              CH2,    ControlKind::Button,  5, 0x04),
    ("cue_default",       CH2,    ControlKind::Button,  5, 0x08),
    ("stop",              CH2,    ControlKind::Button,  5, 0x10),
    ("filterHighKill",    CH2,    ControlKind::Button,  5, 0x20),
    ("filterMidKill",     CH2,    ControlKind::Button,  5, 0x40),
    ("filterLowKill",     CH2,    ControlKind::Button,  5, 0x80),
    // decoded but left unmapped: scratch mode is a host feature
    ("scratch",           MASTER, ControlKind::Button,  6, 0x01),
    ("menu_up",           MASTER, ControlKind::Button,  6, 0x02),
    ("menu_down",         MASTER, ControlKind::Button,  6, 0x04),
    ("menu_left",         MASTER, ControlKind::Button,  6, 0x08),
    ("menu_right",        MASTER, ControlKind::Button,  6, 0x10),
    ("mic_toggle",        MASTER, ControlKind::Button,  6, 0x20),
    ("jog",               CH1,    ControlKind::Encoder, 7, 0xFF),
    ("jog",               CH2,    ControlKind::Encoder, 8, 0xFF),
    ("rate",              CH1,    ControlKind::Fader,   9, 0xFF),
    ("volume",            CH1,    ControlKind::Fader,  10, 0xFF),
    ("pregain",           CH1,    ControlKind::Fader,  11, 0xFF),
    ("filterHigh",        CH1,    ControlKind::Fader,  12, 0xFF),
    ("filterMid",         CH1,    ControlKind::Fader,  13, 0xFF),
    ("filterLow",         CH1,    ControlKind::Fader,  14, 0xFF),
    ("balance",           MASTER, ControlKind::Fader,  15, 0xFF),
    ("volume",            MASTER, ControlKind::Fader,  16, 0xFF),
    ("crossfader",        MASTER, ControlKind::Fader,  17, 0xFF),
    ("headMix",           MASTER, ControlKind::Fader,  18, 0xFF),
    ("rate",              CH2,    ControlKind::Fader,  19, 0xFF),
    ("volume",            CH2,    ControlKind::Fader,  20, 0xFF),
    ("pregain",           CH2,    ControlKind::Fader,  21, 0xFF),
    ("filterHigh",        CH2,    ControlKind::Fader,  22, 0xFF),
    ("filterMid",         CH2,    ControlKind::Fader,  23, 0xFF),
    ("filterLow",         CH2,    ControlKind::Fader,  24, 0xFF),
];

/// The RMX bit-field table
pub fn layout() -> DeviceLayout {
    DeviceLayout {
        name: DEVICE_NAME.to_string(),
        output_reports: Vec::new(),
        controls: CONTROLS
            .iter()
            .map(|&(name, group, kind, offset, mask)| {
                ControlSpec::new(INPUT_REPORT_ID, name, group, kind, offset, mask)
            })
            .collect(),
    }
}

/// Mapping state shared between RMX bindings
#[derive(Debug, Clone)]
pub struct RmxState {
    /// Held while a `source` button is down
    pub shift: SharedFlag,
    /// Crossfader movements reach the host
    pub crossfader_enabled: SharedFlag,
}

impl Default for RmxState {
    fn default() -> Self {
        Self {
            shift: Rc::new(Cell::new(false)),
            crossfader_enabled: Rc::new(Cell::new(true)),
        }
    }
}

/// Build an engine with the RMX layout and mapping installed
pub fn engine<S: ControlSurface, T: ReportSink>(
    surface: S,
    transport: T,
) -> Result<(Engine<S, T>, RmxState), ConfigError> {
    let registry = layout().build_registry()?;
    let mut engine = Engine::new(registry, surface, transport);
    let state = install(&mut engine);
    Ok((engine, state))
}

/// Deck number from a `[ChannelN]` group
fn channel_number(group: &str) -> Option<u32> {
    group
        .strip_prefix("[Channel")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Register the RMX mapping on an engine
///
/// Returns the shared state so callers can inspect or preset it.
pub fn install<S: ControlSurface, T: ReportSink>(engine: &mut Engine<S, T>) -> RmxState {
    let state = RmxState::default();

    // Buttons
    engine.register_handler("play", TriggerMode::Press, Box::new(ToggleControl::new()));
    engine.register_handler("beatsync", TriggerMode::Press, Box::new(SetControl::new()));
    engine.register_handler(
        "headphone_cue",
        TriggerMode::Press,
        Box::new(ToggleControl::to("pfl")),
    );
    engine.register_handler(
        "LoadSelectedTrack",
        TriggerMode::Press,
        Box::new(SetControl::new()),
    );
    engine.register_handler("stop", TriggerMode::Press, Box::new(SetControl::to("eject")));
    engine.register_handler(
        "menu_left",
        TriggerMode::Press,
        Box::new(SetControl::to_group("SelectPrevPlaylist", PLAYLIST)),
    );
    engine.register_handler(
        "menu_right",
        TriggerMode::Press,
        Box::new(SetControl::to_group("SelectNextPlaylist", PLAYLIST)),
    );

    let shift = state.shift.clone();
    engine.capture("cue_default", TriggerMode::All, move |event, ctx| {
        if shift.get() {
            ctx.surface.set(event.group(), "hotcue_1_clear", 1.0);
        } else {
            ctx.surface
                .set(event.group(), "hotcue_1_activate", f64::from(event.value));
        }
        Ok(())
    });

    for (name, direction) in [("menu_up", -1.0), ("menu_down", 1.0)] {
        let shift = state.shift.clone();
        engine.capture(name, TriggerMode::Press, move |_, ctx| {
            let distance = if shift.get() { 10.0 } else { 1.0 };
            ctx.surface
                .set(PLAYLIST, "SelectTrackKnob", distance * direction);
            Ok(())
        });
    }

    // Held jog emulation
    engine.register_handler(
        "pitch_reset",
        TriggerMode::All,
        Box::new(JogButton::new(-1.0, state.shift.clone())),
    );
    engine.register_handler(
        "beatlock",
        TriggerMode::All,
        Box::new(JogButton::new(1.0, state.shift.clone())),
    );

    // EQ kills
    engine.register_handler("filterHighKill", TriggerMode::All, Box::new(SetControl::new()));
    engine.register_handler("filterMidKill", TriggerMode::All, Box::new(SetControl::new()));
    engine.register_handler("filterLowKill", TriggerMode::All, Box::new(SetControl::new()));

    // Keypads
    engine.register_handler(
        "keypad1",
        TriggerMode::Press,
        Box::new(ToggleControl::to("quantize")),
    );
    engine.capture("keypad2", TriggerMode::Press, |event, ctx| {
        let size = ctx.surface.get(event.group(), "beatloop_size");
        ctx.surface
            .set(event.group(), &format!("beatloop_{}_toggle", size), 1.0);
        Ok(())
    });
    engine.register_handler(
        "keypad3",
        TriggerMode::Press,
        Box::new(SetControl::to("loop_halve")),
    );
    let shift = state.shift.clone();
    engine.capture("keypad4", TriggerMode::Press, move |event, ctx| {
        if shift.get() {
            ctx.surface.set(event.group(), "rate", 0.0);
        }
        Ok(())
    });
    engine.register_handler(
        "keypad5",
        TriggerMode::All,
        Box::new(SetControl::to("beatlooproll_0.5_activate")),
    );
    engine.register_handler(
        "keypad6",
        TriggerMode::Press,
        Box::new(SetControl::to("loop_double")),
    );

    // Beatjump; with shift the jump size is halved/doubled instead
    for (name, control, factor) in [
        ("previous", "beatjump_backward", 0.5),
        ("next", "beatjump_forward", 2.0),
    ] {
        let shift = state.shift.clone();
        engine.capture(name, TriggerMode::Press, move |event, ctx| {
            if shift.get() {
                let size = ctx.surface.get(event.group(), "beatjump_size") * factor;
                ctx.surface.set(
                    event.group(),
                    "beatjump_size",
                    size.clamp(BEATJUMP_MIN, BEATJUMP_MAX),
                );
            } else {
                ctx.surface.set(event.group(), control, 1.0);
            }
            Ok(())
        });
    }

    // Shift
    let shift = state.shift.clone();
    let crossfader_enabled = state.crossfader_enabled.clone();
    engine.capture("source", TriggerMode::All, move |event, ctx| {
        if shift.get() && event.value != 0 {
            crossfader_enabled.set(!crossfader_enabled.get());
            log::debug!("RMX: crossfader enabled: {}", crossfader_enabled.get());
            if !crossfader_enabled.get() {
                ctx.surface.set_parameter(MASTER, "crossfader", 0.5);
            }
        }
        shift.set(event.value != 0);
        Ok(())
    });

    // Faders and knobs
    let crossfader_enabled = state.crossfader_enabled.clone();
    engine.capture("crossfader", TriggerMode::All, move |event, ctx| {
        if crossfader_enabled.get() {
            ctx.surface
                .set_parameter(event.group(), event.name(), event.normalized());
        }
        Ok(())
    });
    for name in ["volume", "filterHigh", "filterMid", "filterLow", "headMix"] {
        engine.register_handler(name, TriggerMode::All, Box::new(Continuous::new()));
    }

    engine.capture("pregain", TriggerMode::All, pregain_to_effect);
    engine.register_handler("jog", TriggerMode::All, Box::new(RelativeJog::new()));

    // The right rate fader sends noise on this unit
    engine.capture("rate", TriggerMode::All, |event, ctx| {
        if channel_number(event.group()) == Some(2) {
            return Ok(());
        }
        let rate = if event.value == RATE_CENTER {
            0.5
        } else {
            event.normalized()
        };
        ctx.surface.set_parameter(event.group(), event.name(), rate);
        Ok(())
    });

    log::info!(
        "RMX: mapping installed on {} controls",
        engine.registry().len()
    );
    state
}

/// Gain knobs drive the deck's first effect slot instead of the pregain
fn pregain_to_effect(event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
    let channel = channel_number(event.group())
        .ok_or_else(|| anyhow::anyhow!("pregain on non-deck group {}", event.group()))?;
    let effect = format!("[EffectRack1_EffectUnit{}_Effect1]", channel);
    ctx.surface.set(&effect, "enabled", flag(event.value > 0));
    ctx.surface
        .set_parameter(&effect, "meta", event.normalized());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::JOG_TICK;
    use crate::memory::{MemorySurface, MemoryTransport};

    type RmxEngine = Engine<MemorySurface, MemoryTransport>;

    fn setup(surface: MemorySurface) -> (RmxEngine, RmxState) {
        let _ = env_logger::builder().is_test(true).try_init();
        engine(surface, MemoryTransport::new()).unwrap()
    }

    fn report(bytes: &[(usize, u8)]) -> Vec<u8> {
        let mut report = vec![0u8; INPUT_REPORT_LEN];
        report[0] = INPUT_REPORT_ID;
        for &(offset, value) in bytes {
            report[offset] = value;
        }
        report
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_layout_shape() {
        let layout = layout();
        assert_eq!(layout.controls.len(), 64);
        assert!(layout
            .controls
            .iter()
            .all(|c| c.report_id == INPUT_REPORT_ID && (1..INPUT_REPORT_LEN).contains(&c.offset)));

        let registry = layout.build_registry().unwrap();
        assert!(registry.overlapping_fields().is_empty());
        assert!(registry.output_report_lengths().is_empty());
        assert!(registry.input(MASTER, "crossfader").is_some());
    }

    #[test]
    fn test_play_toggles() {
        let (mut engine, _) = setup(MemorySurface::new());
        engine.on_report(&report(&[(2, 0x04)]));
        assert_eq!(engine.surface().get(CH1, "play"), 1.0);
        engine.on_report(&report(&[]));
        assert_eq!(engine.surface().get(CH1, "play"), 1.0);

        engine.on_report(&report(&[(5, 0x04)]));
        assert_eq!(engine.surface().get(CH2, "play"), 1.0);
    }

    #[test]
    fn test_shift_clears_hotcue() {
        let (mut engine, state) = setup(MemorySurface::new());

        engine.on_report(&report(&[(2, 0x08)]));
        assert_eq!(engine.surface().get(CH1, "hotcue_1_activate"), 1.0);
        engine.on_report(&report(&[]));
        assert_eq!(engine.surface().get(CH1, "hotcue_1_activate"), 0.0);

        engine.on_report(&report(&[(3, 0x04)]));
        assert!(state.shift.get());
        engine.on_report(&report(&[(3, 0x04), (2, 0x08)]));
        assert_eq!(engine.surface().get(CH1, "hotcue_1_clear"), 1.0);

        engine.on_report(&report(&[]));
        assert!(!state.shift.get());
    }

    #[test]
    fn test_double_shift_locks_crossfader() {
        let (mut engine, state) = setup(MemorySurface::new());

        engine.on_report(&report(&[(17, 255)]));
        assert_eq!(engine.surface().get(MASTER, "crossfader"), 1.0);

        engine.on_report(&report(&[(17, 255), (3, 0x04)]));
        engine.on_report(&report(&[(17, 255), (3, 0x44)]));
        assert!(!state.crossfader_enabled.get());
        assert_eq!(engine.surface().get(MASTER, "crossfader"), 0.5);

        engine.on_report(&report(&[(17, 0)]));
        assert_eq!(engine.surface().get(MASTER, "crossfader"), 0.5);
    }

    #[test]
    fn test_rate_fader() {
        let (mut engine, _) = setup(MemorySurface::new());

        engine.on_report(&report(&[(9, 127)]));
        assert_eq!(engine.surface().get(CH1, "rate"), 0.5);
        engine.on_report(&report(&[(9, 255)]));
        assert_eq!(engine.surface().get(CH1, "rate"), 1.0);

        // right fader ignored
        engine.on_report(&report(&[(9, 255), (19, 51)]));
        assert_eq!(engine.surface().get(CH2, "rate"), 0.0);
        engine.on_report(&report(&[(9, 255), (19, 127)]));
        assert_eq!(engine.surface().get(CH2, "rate"), 0.0);
    }

    #[test]
    fn test_shift_high_kill_keeps_right_rate_ignored() {
        let (mut engine, state) = setup(MemorySurface::new());
        engine.on_report(&report(&[(3, 0x40)]));
        assert!(state.shift.get());
        engine.on_report(&report(&[(3, 0x40), (5, 0x20)]));
        assert_eq!(engine.surface().get(CH2, "filterHighKill"), 1.0);

        engine.on_report(&report(&[(3, 0x40), (5, 0x20), (19, 102)]));
        assert_eq!(engine.surface().get(CH2, "rate"), 0.0);
        engine.on_report(&report(&[(3, 0x40), (19, 102)]));
        assert_eq!(engine.surface().get(CH2, "filterHighKill"), 0.0);
    }

    #[test]
    fn test_beatjump() {
        let surface = MemorySurface::new().with_value(CH1, "beatjump_size", 64.0);
        let (mut engine, _) = setup(surface);

        engine.on_report(&report(&[(2, 0x02)]));
        assert_eq!(engine.surface().get(CH1, "beatjump_forward"), 1.0);

        // shift + next doubles, capped at 128
        engine.on_report(&report(&[(3, 0x04)]));
        for _ in 0..2 {
            engine.on_report(&report(&[(3, 0x04), (2, 0x02)]));
            engine.on_report(&report(&[(3, 0x04)]));
        }
        assert_eq!(engine.surface().get(CH1, "beatjump_size"), 128.0);

        engine.on_report(&report(&[(3, 0x04), (2, 0x01)]));
        assert_eq!(engine.surface().get(CH1, "beatjump_size"), 64.0);
        assert_eq!(engine.surface().get(CH1, "beatjump_backward"), 0.0);
    }

    #[test]
    fn test_library_navigation() {
        let (mut engine, _) = setup(MemorySurface::new());
        engine.on_report(&report(&[(6, 0x04)]));
        assert_eq!(engine.surface().get(PLAYLIST, "SelectTrackKnob"), 1.0);

        engine.on_report(&report(&[(3, 0x04)]));
        engine.on_report(&report(&[(3, 0x04), (6, 0x02)]));
        assert_eq!(engine.surface().get(PLAYLIST, "SelectTrackKnob"), -10.0);

        engine.on_report(&report(&[(6, 0x08)]));
        assert_eq!(engine.surface().get(PLAYLIST, "SelectPrevPlaylist"), 1.0);
    }

    #[test]
    fn test_pregain_drives_effect_unit() {
        let (mut engine, _) = setup(MemorySurface::new());
        engine.on_report(&report(&[(21, 51)]));

        let effect = "[EffectRack1_EffectUnit2_Effect1]";
        assert_eq!(engine.surface().get(effect, "enabled"), 1.0);
        assert!(close(engine.surface().get(effect, "meta"), 0.2));

        engine.on_report(&report(&[]));
        assert_eq!(engine.surface().get(effect, "enabled"), 0.0);
    }

    #[test]
    fn test_keypads() {
        let surface = MemorySurface::new().with_value(CH2, "beatloop_size", 4.0);
        let (mut engine, _) = setup(surface);

        engine.on_report(&report(&[(4, 0x02)]));
        assert_eq!(engine.surface().get(CH2, "beatloop_4_toggle"), 1.0);

        engine.on_report(&report(&[(4, 0x01)]));
        assert_eq!(engine.surface().get(CH2, "quantize"), 1.0);

        engine.on_report(&report(&[(4, 0x10)]));
        assert_eq!(engine.surface().get(CH2, "beatlooproll_0.5_activate"), 1.0);
        engine.on_report(&report(&[]));
        assert_eq!(engine.surface().get(CH2, "beatlooproll_0.5_activate"), 0.0);
    }

    #[test]
    fn test_jog_wheel_and_buttons() {
        let (mut engine, _) = setup(MemorySurface::new());

        engine.on_report(&report(&[(7, 10)]));
        engine.on_report(&report(&[(7, 14)]));
        assert_eq!(engine.surface().get(CH1, "jog"), 4.0);

        // beatlock held nudges the deck backwards
        engine.on_report(&report(&[(7, 14), (1, 0x80)]));
        engine.surface_mut().advance(JOG_TICK);
        assert_eq!(engine.surface().get(CH1, "jog"), -1.0);
        engine.on_report(&report(&[(7, 14)]));
        assert_eq!(engine.surface().active_timers(), 0);
    }

    #[test]
    fn test_channel_number() {
        assert_eq!(channel_number("[Channel1]"), Some(1));
        assert_eq!(channel_number("[Channel2]"), Some(2));
        assert_eq!(channel_number("[Master]"), None);
    }
}
