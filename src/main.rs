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
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use songblock::config::Settings;
use songblock::convert::{self, OutputOptions};
use songblock::host;
use songblock::palette::SOUND_PROFILES;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Converts MIDI files into songs for a block game's scripting host."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converts a MIDI file into blocks, host code and reports.
    Convert {
        /// The MIDI file to convert.
        midi_path: PathBuf,
        /// The config file. Defaults are used when it is missing.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The directory the song's output directory is created in.
        #[arg[short, long, default_value = "output"]]
        output_dir: PathBuf,
        /// Also renders preview.wav and preview.mid.
        #[arg[short, long]]
        render_preview: bool,
        /// The folder holding the preview sounds. Overrides the config.
        #[arg[short, long]]
        sound_folder: Option<String>,
        /// The coordinates the blocks will be placed at, in block order. Should be in the form
        /// x,y,z;x,y,z;...
        #[arg[long]]
        coords: Option<String>,
        /// The world already has a tick function that calls the scheduler.
        #[arg[long]]
        has_tick: bool,
    },
    /// Prints the host setup code.
    Setup {
        /// The config file. Defaults are used when it is missing.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The world already has a tick function that calls the scheduler.
        #[arg[long]]
        has_tick: bool,
    },
    /// Prints the code that fetches a song's blocks and plays it.
    Runner {
        /// The block coordinates in block order. Should be in the form x,y,z;x,y,z;...
        coords: String,
    },
    /// Converts a MIDI file and plays it through the runtime, checking every trigger fires on
    /// its tick.
    Simulate {
        /// The MIDI file to simulate.
        midi_path: PathBuf,
        /// The config file. Defaults are used when it is missing.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
    /// Lists the sounds and whether the config makes them available.
    Palette {
        /// The config file. Defaults are used when it is missing.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
    /// Writes the default config to the given path.
    InitConfig {
        /// Where to write the config.
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            midi_path,
            config,
            output_dir,
            render_preview,
            sound_folder,
            coords,
            has_tick,
        } => {
            let mut settings = Settings::load_or_default(config.as_deref())?;
            if let Some(sound_folder) = sound_folder {
                settings.preview_mut().set_sound_folder(&sound_folder);
            }
            let coordinates = coords
                .map(|coords| host::parse_coordinates(&coords))
                .transpose()?;

            let conversion = convert::convert(&fs::read(&midi_path)?, &settings)?;
            let options = OutputOptions {
                coordinates,
                has_tick,
                render_preview,
            };
            let dir = convert::song_dir(&output_dir, &midi_path);
            let written = convert::write_outputs(&conversion, &settings, &options, &dir)?;

            let stats = &conversion.stats;
            println!(
                "Mapped {} of {} notes into {} events ({} dropped).",
                stats.mapped_notes, stats.total_notes, stats.events, stats.dropped_notes
            );
            println!(
                "Encoded {} words ({} fillers) into {} blocks.",
                stats.encoded_words, stats.filler_words, stats.blocks
            );
            println!("Files:");
            for path in written {
                println!("- {}", path.display());
            }
        }
        Commands::Setup { config, has_tick } => {
            let settings = Settings::load_or_default(config.as_deref())?;
            let codec = settings.codec().build()?;
            println!("{}", host::setup_code(&codec, settings.runtime(), has_tick));
            if has_tick {
                println!("\nCall this from the existing tick function:\n{}", host::TICK_CORE);
            }
        }
        Commands::Runner { coords } => {
            let coordinates = host::parse_coordinates(&coords)?;
            println!("{}", host::runner_code(&coordinates));
        }
        Commands::Simulate { midi_path, config } => {
            let settings = Settings::load_or_default(config.as_deref())?;
            let conversion = convert::convert(&fs::read(&midi_path)?, &settings)?;
            let simulation = convert::simulate(&conversion, &settings)?;

            println!(
                "Ran {} ticks, fired {} of {} triggers, {} late.",
                simulation.ticks_run,
                simulation.fired.len(),
                conversion.timed.len(),
                simulation.late
            );
            if !simulation.matches(&conversion) {
                return Err("fired ticks do not match the mapped ticks".into());
            }
            println!("Every trigger fired on its mapped tick.");
        }
        Commands::Palette { config } => {
            let settings = Settings::load_or_default(config.as_deref())?;
            let palette = settings.palette()?;

            println!("Sounds:");
            for sound in SOUND_PROFILES.iter() {
                println!(
                    "- {} {} ({} Hz, {}s){}",
                    sound.id(),
                    sound.name(),
                    sound.natural_pitch_hz(),
                    sound.natural_duration_s(),
                    if palette.contains(sound.id()) {
                        ""
                    } else {
                        " [unavailable]"
                    }
                );
            }
        }
        Commands::InitConfig { path } => {
            Settings::default().save(&path)?;
            println!("Wrote default config to {}.", path.display());
        }
    }

    Ok(())
}
