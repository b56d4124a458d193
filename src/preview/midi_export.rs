// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::codec::LOUDNESS_LEVELS;
use crate::mapper::TimedEvent;
use crate::palette::sound_profile;

use super::PreviewError;

/// 60 BPM, so a quarter note lasts one second.
const TEMPO_US: u32 = 1_000_000;

/// MIDI key of piano index 0 (A0).
const PIANO_KEY_OFFSET: u8 = 21;

/// Writes the triggers as a Standard MIDI File with one pulse per host tick. Each sound gets
/// its own channel and every note lasts as long as its sound rings at its rate.
pub fn export_midi(
    events: &[TimedEvent],
    ticks_per_second: u32,
) -> Result<Vec<u8>, PreviewError> {
    let resolution = u16::try_from(ticks_per_second)
        .ok()
        .filter(|tps| *tps > 0 && *tps <= 0x7fff)
        .ok_or(PreviewError::Resolution(ticks_per_second))?;

    // (tick, is note on, kind). Note offs sort first so a restruck key is not cut short.
    let mut timeline: Vec<(u64, bool, TrackEventKind<'static>)> = Vec::new();
    for event in events {
        let channel = u4::from(event.sound_id);
        let key = u7::from(event.piano_index.saturating_add(PIANO_KEY_OFFSET));
        let gain = LOUDNESS_LEVELS
            .get(event.loudness_index as usize)
            .copied()
            .unwrap_or(0.0);
        let vel = u7::from(((gain * 127.0).round() as u8).max(1));
        let length = sound_profile(event.sound_id)
            .map(|sound| {
                let seconds = sound.natural_duration_s() / event.rate.max(f64::MIN_POSITIVE);
                (seconds * ticks_per_second as f64).round() as u64
            })
            .unwrap_or(1)
            .max(1);

        timeline.push((
            event.tick,
            true,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            },
        ));
        timeline.push((
            event.tick + length,
            false,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff { key, vel: u7::from(0) },
            },
        ));
    }
    // Stable, so notes on the same tick keep their trigger order.
    timeline.sort_by_key(|(tick, on, _)| (*tick, *on));

    let mut track = vec![TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(TEMPO_US))),
    }];
    let mut previous = 0;
    for (tick, _, kind) in timeline {
        track.push(TrackEvent {
            delta: u28::from((tick - previous) as u32),
            kind,
        });
        previous = tick;
    }
    track.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::from(resolution))),
        tracks: vec![track],
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::time::Duration;

    use super::*;
    use crate::midi::{key_to_hz, read_notes};

    fn timed(
        tick: u64,
        sound_id: u8,
        piano_index: u8,
        loudness_index: u8,
        rate: f64,
    ) -> TimedEvent {
        TimedEvent {
            tick,
            sound_id,
            piano_index,
            loudness_index,
            rate,
        }
    }

    #[test]
    fn test_export_reads_back() -> Result<(), Box<dyn Error>> {
        let events = vec![
            timed(0, 0, 48, 0, 1.0),
            timed(0, 3, 48, 0, 1.0),
            timed(40, 0, 51, 2, 2.0),
        ];
        let bytes = export_midi(&events, 20)?;
        let smf = Smf::parse(&bytes)?;
        assert_eq!(Timing::Metrical(u15::from(20)), smf.header.timing);

        let notes = read_notes(&bytes, Duration::ZERO)?;
        assert_eq!(3, notes.len());
        assert!((notes[0].pitch_hz() - key_to_hz(69)).abs() < 1e-9);
        assert_eq!(0.0, notes[0].onset_s());
        // harp_pling rings for 0.84s at rate 1: 17 ticks at 20 per second.
        assert!((notes[0].duration_s() - 0.85).abs() < 1e-9);
        assert!((notes[2].onset_s() - 2.0).abs() < 1e-9);
        assert!((notes[2].duration_s() - 0.4).abs() < 1e-9);
        assert!((notes[2].velocity() - 76.0 / 127.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_export_rejects_resolution() {
        assert!(matches!(
            export_midi(&[], 0),
            Err(PreviewError::Resolution(0))
        ));
        assert!(matches!(
            export_midi(&[], 40000),
            Err(PreviewError::Resolution(40000))
        ));
    }
}
