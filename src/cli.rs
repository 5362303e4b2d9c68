use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::settings::{Profile, ReaderSettings};
use crate::sweep::config::{CaptureConfig, ReaderConfig, SweepConfig};

#[derive(Parser, Debug)]
#[command(
    name = "tagsweep",
    version,
    about = "RFID frequency/power sweep and capture tool",
    long_about = "Drives an RFID reader across a frequency/power grid (sweep) or reads \
                  continuously at a fixed power (capture), writing every measurement to an \
                  SQLite file. Press any key or Ctrl-C to stop a run early."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Don't watch the keyboard for a stop request (Ctrl-C still stops)
    #[arg(long, global = true, default_value_t = false)]
    pub no_keyboard: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sweep frequency and power, recording the tags of interest at each point
    Sweep(SweepArgs),
    /// Read continuously at a fixed power, recording every observation
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
pub struct ReaderArgs {
    /// Reader URI, e.g. sim:///path/to/scenario.json
    pub uri: String,

    /// Antenna ports, comma separated (e.g. 1,2)
    #[arg(long = "ant", value_delimiter = ',')]
    pub antennas: Vec<u8>,

    /// Read power in cdBm applied during setup
    #[arg(long = "pow")]
    pub read_power: Option<i32>,

    /// Index into the reader's supported-region list
    #[arg(long = "reg")]
    pub region_index: Option<usize>,

    /// SQLite database file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Read window in milliseconds
    #[arg(long)]
    pub dwell: Option<u64>,

    /// Settle delay in milliseconds
    #[arg(long)]
    pub settle: Option<u64>,

    /// JSON profile supplying defaults
    #[arg(long, env = "TAGSWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log the metadata present on every observation
    #[arg(long, default_value_t = false)]
    pub print_metadata: bool,
}

impl ReaderArgs {
    fn apply(&self, reader: &mut ReaderConfig, settings: &ReaderSettings) {
        if !self.antennas.is_empty() {
            reader.antennas = self.antennas.clone();
        } else if let Some(antennas) = &settings.antennas {
            reader.antennas = antennas.clone();
        }
        if let Some(power) = self.read_power.or(settings.read_power) {
            reader.read_power = Some(power);
        }
        if let Some(index) = self.region_index.or(settings.region_index) {
            reader.region_index = index;
        }
        reader.print_metadata = self.print_metadata || settings.print_metadata.unwrap_or(false);
    }

    fn dwell(&self, settings: &ReaderSettings) -> Option<Duration> {
        self.dwell.or(settings.dwell_ms).map(Duration::from_millis)
    }

    fn settle(&self, settings: &ReaderSettings) -> Option<Duration> {
        self.settle.or(settings.settle_ms).map(Duration::from_millis)
    }
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub reader: ReaderArgs,

    /// Tag of interest (hex EPC); repeat for several
    #[arg(long = "tag", conflicts_with_all = ["epc1", "epc2"])]
    pub tags: Vec<String>,

    /// First tag of interest
    #[arg(long)]
    pub epc1: Option<String>,

    /// Second tag of interest
    #[arg(long)]
    pub epc2: Option<String>,

    /// Frequency step in MHz
    #[arg(long = "freqstep")]
    pub freq_step: Option<f64>,

    /// Power step in cdBm
    #[arg(long = "powstep")]
    pub pow_step: Option<i32>,

    /// Lowest frequency in kHz
    #[arg(long = "minfreq")]
    pub min_freq: Option<u32>,

    /// Highest frequency in kHz
    #[arg(long = "maxfreq")]
    pub max_freq: Option<u32>,

    /// Lowest power in cdBm
    #[arg(long = "minpow")]
    pub min_pow: Option<i32>,

    /// Highest power in cdBm
    #[arg(long = "maxpow")]
    pub max_pow: Option<i32>,

    /// Number of passes over the grid; 0 repeats until stopped
    #[arg(long)]
    pub passes: Option<u32>,
}

impl SweepArgs {
    pub fn resolve(&self, profile: &Profile) -> SweepConfig {
        let mut config = SweepConfig::new(ReaderConfig::new(&self.reader.uri));
        self.reader.apply(&mut config.reader, &profile.reader);
        let sweep = &profile.sweep;

        if let Some(tags) = &sweep.tags {
            config.tags_of_interest = tags.clone();
        }
        for (slot, epc) in [(0, &self.epc1), (1, &self.epc2)] {
            if let Some(epc) = epc {
                match config.tags_of_interest.get_mut(slot) {
                    Some(existing) => *existing = epc.clone(),
                    None => config.tags_of_interest.push(epc.clone()),
                }
            }
        }
        if !self.tags.is_empty() {
            config.tags_of_interest = self.tags.clone();
        }

        let frequency = &mut config.frequency;
        frequency.min_khz = self.min_freq.or(sweep.min_freq).unwrap_or(frequency.min_khz);
        frequency.max_khz = self.max_freq.or(sweep.max_freq).unwrap_or(frequency.max_khz);
        frequency.step_mhz = self.freq_step.or(sweep.freq_step).unwrap_or(frequency.step_mhz);

        let power = &mut config.power;
        power.min = self.min_pow.or(sweep.min_pow).unwrap_or(power.min);
        power.max = self.max_pow.or(sweep.max_pow).unwrap_or(power.max);
        power.step = self.pow_step.or(sweep.pow_step).unwrap_or(power.step);

        if let Some(passes) = self.passes.or(sweep.passes) {
            config.passes = passes;
        }
        if let Some(database) = self.reader.file.clone().or_else(|| sweep.database.clone()) {
            config.database = database;
        }
        if let Some(dwell) = self.reader.dwell(&profile.reader) {
            config.dwell = dwell;
        }
        if let Some(settle) = self.reader.settle(&profile.reader) {
            config.settle = settle;
        }
        config
    }
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub reader: ReaderArgs,

    /// Capture duration in seconds
    #[arg(long = "time")]
    pub duration_secs: Option<u64>,
}

impl CaptureArgs {
    pub fn resolve(&self, profile: &Profile) -> CaptureConfig {
        let mut config = CaptureConfig::new(ReaderConfig::new(&self.reader.uri));
        self.reader.apply(&mut config.reader, &profile.reader);

        if let Some(secs) = self.duration_secs.or(profile.capture.duration_secs) {
            config.duration = Duration::from_secs(secs);
        }
        if let Some(database) = self
            .reader
            .file
            .clone()
            .or_else(|| profile.capture.database.clone())
        {
            config.database = database;
        }
        if let Some(dwell) = self.reader.dwell(&profile.reader) {
            config.dwell = dwell;
        }
        if let Some(settle) = self.reader.settle(&profile.reader) {
            config.settle = settle;
        }
        config
    }
}

impl Command {
    pub fn config_path(&self) -> Option<&PathBuf> {
        match self {
            Command::Sweep(args) => args.reader.config.as_ref(),
            Command::Capture(args) => args.reader.config.as_ref(),
        }
    }
}
