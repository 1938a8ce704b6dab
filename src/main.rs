use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use thalia::shared::{BoardId, BusId, ImpulseKind, NUM_BOARDS, PadId, PercussionKind, WaveformKind};
use thalia::synth::ControllerPosition;
use thalia::{InstrumentConfig, load_config, start_audio};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => load_config(&path).unwrap_or_else(|| {
            log::warn!("could not load {}, using defaults", path.display());
            InstrumentConfig::default()
        }),
        None => InstrumentConfig::default(),
    };
    let audio = start_audio(&config)?;

    // reverbs load in the background; playing starts right away
    let mut loads = Vec::new();
    for board in 0..NUM_BOARDS as u8 {
        if let Some(kind) = config.board.impulse {
            loads.push(audio.set_reverb_impulse_response(BusId::Board(BoardId(board)), kind));
        }
    }
    if let Some(kind) = config.percussion.impulse {
        loads.push(audio.set_reverb_impulse_response(BusId::Percussion, kind));
    }

    let beat = Duration::from_millis(250);
    let left = BoardId(0);

    // a rising arpeggio on the left board
    for pad in [0u8, 4, 7, 11] {
        let pad = PadId::new(left.0, pad);
        audio.press_pad(pad);
        let drum = if pad.index == 0 { PercussionKind::Kick } else { PercussionKind::Hihat };
        audio.trigger_percussion(drum);
        sleep(beat);
        audio.release_note(pad);
    }

    // hold a chord and bend it with the controller
    audio.toggle_waveform(left, WaveformKind::Sawtooth);
    let chord = [0u8, 3, 7].map(|i| PadId::new(left.0, i));
    for pad in chord {
        audio.press_pad(pad);
    }
    for (x, y) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, 0.0)] {
        audio.set_controller_position(left, ControllerPosition::new(x, y));
        audio.trigger_percussion(PercussionKind::Snare);
        sleep(beat * 2);
    }

    // swap the room while the chord rings
    audio.set_reverb_wet_gain(BusId::Board(left), 0.5);
    let swap = audio.set_reverb_impulse_response(BusId::Board(left), ImpulseKind::LargeHall);
    sleep(beat * 4);
    for pad in chord {
        audio.release_note(pad);
    }
    audio.trigger_percussion(PercussionKind::Cymbal1);
    sleep(beat * 8);

    for load in loads.into_iter().chain(std::iter::once(swap)) {
        match load.join() {
            Ok(Err(e)) => log::warn!("{e}"),
            Err(_) => log::warn!("impulse loader panicked"),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}
