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

//! The fixed palette of host sounds and per-note sound selection.
//!
//! The host can only trigger a handful of built-in samples, each with a natural pitch and a
//! natural decay length. A note is approximated by speeding a sample up or down, so choosing a
//! sample is a trade-off between how far it gets pitched and how well its pitched decay matches
//! the length of the note.

use crate::midi::Note;

/// Reference frequencies of the 88 piano keys, A0 through C8.
pub const PIANO_HZ: [f64; 88] = [
    27.50, 29.14, 30.87, 32.70, 34.65, 36.71, 38.89, 41.20, 43.65, 46.25, 49.00, 51.91, 55.00,
    58.27, 61.74, 65.41, 69.30, 73.42, 77.78, 82.41, 87.31, 92.50, 98.00, 103.83, 110.00, 116.54,
    123.47, 130.81, 138.59, 146.83, 155.56, 164.81, 174.61, 185.00, 196.00, 207.65, 220.00,
    233.08, 246.94, 261.63, 277.18, 293.66, 311.13, 329.63, 349.23, 369.99, 392.00, 415.30,
    440.00, 466.16, 493.88, 523.25, 554.37, 587.33, 622.25, 659.26, 698.46, 739.99, 783.99,
    830.61, 880.00, 932.33, 987.77, 1046.50, 1108.73, 1174.66, 1244.51, 1318.51, 1396.91,
    1479.98, 1567.98, 1661.22, 1760.00, 1864.66, 1975.53, 2093.00, 2217.46, 2349.32, 2489.02,
    2637.02, 2793.83, 2959.96, 3135.96, 3322.44, 3520.00, 3729.31, 3951.07, 4186.01,
];

/// Number of piano keys addressable by a piano index.
pub const PIANO_KEYS: usize = PIANO_HZ.len();

/// Piano index of A4 (440 Hz).
pub const A4_INDEX: u8 = 48;

/// The sound that can be used at any pitch and duration.
pub const PRIMARY_SOUND_ID: u8 = 0;

/// A sampled sound built into the host.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundProfile {
    /// The wire id of the sound. Part of the encoded format, so it never changes.
    id: u8,
    /// The name the host knows the sound by.
    name: &'static str,
    /// The pitch the sample plays at a playback rate of 1.
    natural_pitch_hz: f64,
    /// The audible length of the sample at a playback rate of 1.
    natural_duration_s: f64,
}

impl SoundProfile {
    const fn new(
        id: u8,
        name: &'static str,
        natural_pitch_hz: f64,
        natural_duration_s: f64,
    ) -> SoundProfile {
        SoundProfile {
            id,
            name,
            natural_pitch_hz,
            natural_duration_s,
        }
    }

    /// Gets the wire id.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Gets the host name of the sound.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Gets the natural pitch in Hz.
    pub fn natural_pitch_hz(&self) -> f64 {
        self.natural_pitch_hz
    }

    /// Gets the natural duration in seconds.
    pub fn natural_duration_s(&self) -> f64 {
        self.natural_duration_s
    }

    /// Returns true if this is the primary sound.
    pub fn is_primary(&self) -> bool {
        self.id == PRIMARY_SOUND_ID
    }

    /// The playback rate needed to sound at the given pitch.
    pub fn rate_for(&self, pitch_hz: f64) -> f64 {
        pitch_hz / self.natural_pitch_hz
    }
}

/// Every sound the host provides, indexed by id.
pub static SOUND_PROFILES: [SoundProfile; 5] = [
    SoundProfile::new(0, "harp_pling", 260.79, 0.84),
    SoundProfile::new(1, "game_start_countdown_01", 329.75, 1.0),
    SoundProfile::new(2, "game_start_countdown_02", 164.84, 0.99),
    SoundProfile::new(3, "game_start_countdown_03", 164.87, 1.0),
    SoundProfile::new(4, "game_start_countdown_final", 658.83, 1.58),
];

/// Looks up a built-in sound by wire id.
pub fn sound_profile(id: u8) -> Option<&'static SoundProfile> {
    SOUND_PROFILES.get(id as usize)
}

/// A palette name that does not match any built-in sound.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown palette sound '{0}'")]
pub struct UnknownSound(pub String);

/// The subset of built-in sounds available to the mapper.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    sounds: Vec<SoundProfile>,
}

impl Palette {
    /// A palette with every built-in sound available.
    pub fn builtin() -> Palette {
        Palette {
            sounds: SOUND_PROFILES.to_vec(),
        }
    }

    /// A palette restricted to the named sounds. A trailing ".wav" on a name is ignored.
    /// Sounds keep their built-in order regardless of the order of the names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Palette, UnknownSound> {
        let mut wanted = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let name = name.strip_suffix(".wav").unwrap_or(name);
            match SOUND_PROFILES.iter().find(|sound| sound.name == name) {
                Some(sound) => wanted.push(sound.id),
                None => return Err(UnknownSound(name.to_string())),
            }
        }

        Ok(Palette {
            sounds: SOUND_PROFILES
                .iter()
                .filter(|sound| wanted.contains(&sound.id))
                .cloned()
                .collect(),
        })
    }

    /// Gets the available sounds in id order.
    pub fn sounds(&self) -> &[SoundProfile] {
        &self.sounds
    }

    /// Returns true if the sound with the given id is available.
    pub fn contains(&self, id: u8) -> bool {
        self.sounds.iter().any(|sound| sound.id == id)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::builtin()
    }
}

/// One sound chosen for a note, with the rate that pitches it to the note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundChoice {
    pub sound_id: u8,
    pub rate: f64,
}

/// A sound that passed the decay check, ranked by how well its decay fits.
struct Candidate {
    choice: SoundChoice,
    duration_diff: f64,
    primary: bool,
}

/// Selects the sounds to trigger for a note, at most `max_layers` of them.
///
/// A sound qualifies if it is primary or if its pitched decay is no longer than the note.
/// Qualifying sounds are ranked by how closely their pitched decay matches the note's duration.
/// The primary sound goes first whenever it qualifies and the remaining layers are filled from
/// the ranked non-primary sounds. An empty result means the note cannot be played.
pub fn select_sounds(note: &Note, palette: &Palette, max_layers: usize) -> Vec<SoundChoice> {
    let mut candidates: Vec<Candidate> = palette
        .sounds()
        .iter()
        .filter_map(|sound| {
            let rate = sound.rate_for(note.pitch_hz());
            let pitched_duration = sound.natural_duration_s() / rate;
            if sound.is_primary() || pitched_duration <= note.duration_s() {
                Some(Candidate {
                    choice: SoundChoice {
                        sound_id: sound.id(),
                        rate,
                    },
                    duration_diff: (note.duration_s() - pitched_duration).abs(),
                    primary: sound.is_primary(),
                })
            } else {
                None
            }
        })
        .collect();

    // Stable, so equally good sounds stay in palette order.
    candidates.sort_by(|a, b| a.duration_diff.total_cmp(&b.duration_diff));

    let mut chosen = Vec::with_capacity(max_layers.min(candidates.len()));
    if max_layers == 0 {
        return chosen;
    }
    if let Some(primary) = candidates.iter().find(|candidate| candidate.primary) {
        chosen.push(primary.choice);
    }
    let remaining = max_layers - chosen.len();
    chosen.extend(
        candidates
            .iter()
            .filter(|candidate| !candidate.primary)
            .take(remaining)
            .map(|candidate| candidate.choice),
    );
    chosen
}

/// Returns the index of the piano key closest to the given frequency. The lowest index wins a tie.
pub fn piano_index(pitch_hz: f64) -> u8 {
    let mut closest = 0;
    let mut min_diff = f64::INFINITY;
    for (index, reference) in PIANO_HZ.iter().enumerate() {
        let diff = (reference - pitch_hz).abs();
        if diff < min_diff {
            min_diff = diff;
            closest = index;
        }
    }
    closest as u8
}

/// The equal-tempered frequency of a piano index, relative to A4 = 440 Hz.
pub fn piano_hz(piano_index: u8) -> f64 {
    440.0 * 2f64.powf((piano_index as f64 - A4_INDEX as f64) / 12.0)
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::testutil::note;

    #[test]
    fn test_piano_index() {
        assert_eq!(48, piano_index(440.0));
        assert_eq!(0, piano_index(1.0));
        assert_eq!(87, piano_index(20000.0));
        assert_eq!(39, piano_index(261.0));
        assert_eq!(49, piano_index(460.0));
    }

    #[test]
    fn test_piano_hz() {
        assert!((piano_hz(A4_INDEX) - 440.0).abs() < 1e-9);
        assert!((piano_hz(60) - 880.0).abs() < 1e-9);
        for (index, reference) in PIANO_HZ.iter().enumerate() {
            assert!((piano_hz(index as u8) - reference).abs() < 0.02);
        }
    }

    #[test]
    fn test_palette_from_names() -> Result<(), Box<dyn Error>> {
        let palette = Palette::from_names(&["game_start_countdown_final", "harp_pling.wav"])?;
        let ids: Vec<u8> = palette.sounds().iter().map(|sound| sound.id()).collect();
        assert_eq!(vec![0, 4], ids);
        assert!(palette.contains(4));
        assert!(!palette.contains(1));

        assert_eq!(
            Err(UnknownSound("cowbell".to_string())),
            Palette::from_names(&["cowbell"])
        );
        Ok(())
    }

    #[test]
    fn test_select_primary_only() {
        let chosen = select_sounds(&note(0.0, 440.0, 0.5, 1.0), &Palette::builtin(), 1);
        assert_eq!(1, chosen.len());
        assert_eq!(PRIMARY_SOUND_ID, chosen[0].sound_id);
        assert!((chosen[0].rate - 440.0 / 260.79).abs() < 1e-9);
    }

    #[test]
    fn test_select_layers_ranked_by_duration_fit() {
        // At 440Hz sound 3 decays in ~0.375s and sound 2 in ~0.371s. Sound 1 (~0.75s) and
        // sound 4 (~2.37s) are both too long for a half second note.
        let chosen = select_sounds(&note(0.0, 440.0, 0.5, 1.0), &Palette::builtin(), 5);
        let ids: Vec<u8> = chosen.iter().map(|choice| choice.sound_id).collect();
        assert_eq!(vec![0, 3, 2], ids);

        let chosen = select_sounds(&note(0.0, 440.0, 0.5, 1.0), &Palette::builtin(), 2);
        let ids: Vec<u8> = chosen.iter().map(|choice| choice.sound_id).collect();
        assert_eq!(vec![0, 3], ids);
    }

    #[test]
    fn test_select_layer_cap_and_uniqueness() {
        let palette = Palette::builtin();
        for max_layers in 1..=5 {
            for hz in [55.0, 220.0, 440.0, 1760.0] {
                for duration in [0.05, 0.3, 1.0, 4.0] {
                    let chosen = select_sounds(&note(0.0, hz, duration, 1.0), &palette, max_layers);
                    assert!(chosen.len() <= max_layers);
                    assert_eq!(PRIMARY_SOUND_ID, chosen[0].sound_id);
                    let mut ids: Vec<u8> = chosen.iter().map(|c| c.sound_id).collect();
                    ids.sort();
                    ids.dedup();
                    assert_eq!(chosen.len(), ids.len());
                }
            }
        }
    }

    #[test]
    fn test_select_without_primary() -> Result<(), Box<dyn Error>> {
        let palette = Palette::from_names(&["game_start_countdown_01", "game_start_countdown_02"])?;

        // Long enough for both decays; the closer fit comes first.
        let chosen = select_sounds(&note(0.0, 329.75, 1.2, 1.0), &palette, 2);
        let ids: Vec<u8> = chosen.iter().map(|choice| choice.sound_id).collect();
        assert_eq!(vec![1, 2], ids);

        // Too short for any decay and no primary to fall back on.
        assert!(select_sounds(&note(0.0, 329.75, 0.1, 1.0), &palette, 2).is_empty());
        Ok(())
    }
}
