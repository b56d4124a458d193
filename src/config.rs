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
use std::fs;
use std::path::Path;
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::palette::{Palette, SOUND_PROFILES};

mod codec;
mod error;
mod layering;
mod preview;
mod runtime;

pub use self::codec::Codec;
pub use self::error::ConfigError;
pub use self::layering::Layering;
pub use self::preview::Preview;
pub use self::runtime::Runtime;

/// Default host callback rate.
pub const DEFAULT_TICKS_PER_SECOND: u32 = 20;

/// Notes this short or shorter are discarded by default.
const DEFAULT_MIN_NOTE_DURATION: Duration = Duration::from_millis(10);

/// The converter configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Settings {
    /// Names of the sounds the mapper may use. All sounds when unset.
    palette: Option<Vec<String>>,

    /// Host callbacks per second.
    ticks_per_second: Option<u32>,

    /// Notes no longer than this are discarded, e.g. "10ms".
    min_note_duration: Option<String>,

    #[serde(default)]
    layering: Layering,

    #[serde(default)]
    codec: Codec,

    #[serde(default)]
    runtime: Runtime,

    #[serde(default)]
    preview: Preview,
}

impl Settings {
    /// Creates settings from their sections.
    pub fn new(
        palette: Option<Vec<String>>,
        ticks_per_second: u32,
        layering: Layering,
        codec: Codec,
        runtime: Runtime,
    ) -> Settings {
        Settings {
            palette,
            ticks_per_second: Some(ticks_per_second),
            min_note_duration: None,
            layering,
            codec,
            runtime,
            preview: Preview::default(),
        }
    }

    /// Parses and validates settings from a YAML or JSON file.
    pub fn deserialize(path: &Path) -> Result<Settings, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from the path if given. A missing file falls back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Settings, ConfigError> {
        match path {
            Some(path) if path.exists() => Settings::deserialize(path),
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Settings::default())
            }
            None => Ok(Settings::default()),
        }
    }

    /// Serialize and save the settings to a YAML file at the given path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = serde_yml::to_string(self)?;
        fs::write(path, serialized)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Checks every section so that a conversion never starts with unusable settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.palette()?;
        self.min_note_duration()?;
        self.preview.tail()?;
        if self.ticks_per_second() == 0 {
            return Err(ConfigError::TicksPerSecond);
        }
        let max_layers = self.layering.max_layers();
        if max_layers == 0 || max_layers > SOUND_PROFILES.len() {
            return Err(ConfigError::MaxLayers {
                value: max_layers,
                max: SOUND_PROFILES.len(),
            });
        }
        self.codec.build()?;
        if self.runtime.batch_size() == 0 {
            return Err(ConfigError::TooSmall {
                field: "runtime.batch_size",
                value: 0,
                min: 1,
            });
        }
        // A tick must fit a full decode batch plus the decode task itself.
        let min_tasks = self.runtime.batch_size() + 1;
        if self.runtime.max_tasks_per_tick() < min_tasks {
            return Err(ConfigError::TooSmall {
                field: "runtime.max_tasks_per_tick",
                value: self.runtime.max_tasks_per_tick(),
                min: min_tasks,
            });
        }
        Ok(())
    }

    /// Returns the available palette (default: every sound).
    pub fn palette(&self) -> Result<Palette, ConfigError> {
        match &self.palette {
            Some(names) => Ok(Palette::from_names(names)?),
            None => Ok(Palette::builtin()),
        }
    }

    /// Returns the host callback rate (default: 20).
    pub fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second.unwrap_or(DEFAULT_TICKS_PER_SECOND)
    }

    /// Returns the minimum note duration (default: 10ms).
    pub fn min_note_duration(&self) -> Result<Duration, ConfigError> {
        match &self.min_note_duration {
            Some(duration) => parse_duration("min_note_duration", duration),
            None => Ok(DEFAULT_MIN_NOTE_DURATION),
        }
    }

    pub fn layering(&self) -> &Layering {
        &self.layering
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut Preview {
        &mut self.preview
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let settings = Settings::default();
        settings.validate()?;
        assert_eq!(20, settings.ticks_per_second());
        assert_eq!(Duration::from_millis(10), settings.min_note_duration()?);
        assert_eq!(2, settings.layering().max_layers());
        assert_eq!(16000, settings.codec().block_size());
        assert_eq!(300, settings.codec().max_delay());
        assert_eq!(50, settings.runtime().batch_size());
        assert_eq!(64, settings.runtime().max_tasks_per_tick());
        assert_eq!(40, settings.runtime().lookahead_ticks());
        assert_eq!(44100, settings.preview().sample_rate());
        assert_eq!(Duration::from_secs(3), settings.preview().tail()?);
        assert_eq!(5, settings.palette()?.sounds().len());
        Ok(())
    }

    #[test]
    fn test_deserialize_yaml() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("songblock.yaml");
        fs::write(
            &path,
            r#"
palette:
  - harp_pling
  - game_start_countdown_final.wav
ticks_per_second: 40
min_note_duration: 25ms
layering:
  max_layers: 1
codec:
  block_size: 4000
runtime:
  batch_size: 10
preview:
  tail: 1s
  sound_folder: /tmp/sounds
"#,
        )?;

        let settings = Settings::deserialize(&path)?;
        let ids: Vec<u8> = settings.palette()?.sounds().iter().map(|s| s.id()).collect();
        assert_eq!(vec![0, 4], ids);
        assert_eq!(40, settings.ticks_per_second());
        assert_eq!(Duration::from_millis(25), settings.min_note_duration()?);
        assert_eq!(1, settings.layering().max_layers());
        assert_eq!(4000, settings.codec().block_size());
        assert_eq!(300, settings.codec().max_delay());
        assert_eq!(10, settings.runtime().batch_size());
        assert_eq!(Duration::from_secs(1), settings.preview().tail()?);
        assert_eq!(
            std::path::PathBuf::from("/tmp/sounds"),
            settings.preview().sound_folder()
        );
        Ok(())
    }

    #[test]
    fn test_validation_errors() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let cases = [
            ("layering:\n  max_layers: 6\n", "max_layers"),
            ("layering:\n  max_layers: 0\n", "max_layers"),
            ("palette: [kazoo]\n", "kazoo"),
            ("ticks_per_second: 0\n", "ticks_per_second"),
            ("codec:\n  max_delay: 1200\n", "codec"),
            ("codec:\n  block_size: 6\n", "codec"),
            ("runtime:\n  batch_size: 0\n", "batch_size"),
            ("runtime:\n  batch_size: 100\n", "max_tasks_per_tick"),
            ("runtime:\n  max_tasks_per_tick: 50\n", "max_tasks_per_tick"),
            ("min_note_duration: soon\n", "min_note_duration"),
        ];
        for (index, (yaml, needle)) in cases.iter().enumerate() {
            let path = dir.path().join(format!("bad{index}.yaml"));
            fs::write(&path, yaml)?;
            match Settings::deserialize(&path) {
                Ok(_) => panic!("expected {yaml:?} to be rejected"),
                Err(e) => assert!(
                    e.to_string().contains(needle),
                    "error '{e}' does not mention {needle}"
                ),
            }
        }
        Ok(())
    }

    #[test]
    fn test_task_budget_fits_decode_batch() -> Result<(), Box<dyn Error>> {
        let settings = |batch_size, max_tasks_per_tick| {
            Settings::new(
                None,
                20,
                Layering::new(2),
                Codec::new(16000, 300),
                Runtime::new(batch_size, max_tasks_per_tick, 40),
            )
        };
        assert!(matches!(
            settings(100, 64).validate(),
            Err(ConfigError::TooSmall {
                field: "runtime.max_tasks_per_tick",
                value: 64,
                min: 101
            })
        ));
        assert!(settings(64, 64).validate().is_err());
        settings(63, 64).validate()?;
        Ok(())
    }

    #[test]
    fn test_load_or_default_missing_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let settings = Settings::load_or_default(Some(&dir.path().join("missing.yaml")))?;
        assert_eq!(20, settings.ticks_per_second());
        Ok(())
    }

    #[test]
    fn test_save_and_reload() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("saved.yaml");
        let settings = Settings::new(
            Some(vec!["harp_pling".to_string()]),
            10,
            Layering::new(1),
            Codec::new(8000, 200),
            Runtime::new(20, 30, 10),
        );
        settings.save(&path)?;

        let reloaded = Settings::deserialize(&path)?;
        assert_eq!(10, reloaded.ticks_per_second());
        assert_eq!(1, reloaded.layering().max_layers());
        assert_eq!(8000, reloaded.codec().block_size());
        assert_eq!(200, reloaded.codec().max_delay());
        assert_eq!(30, reloaded.runtime().max_tasks_per_tick());
        assert_eq!(1, reloaded.palette()?.sounds().len());
        Ok(())
    }
}
