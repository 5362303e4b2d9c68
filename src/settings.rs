use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Reader options shared by both run modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderSettings {
    pub antennas: Option<Vec<u8>>,
    pub read_power: Option<i32>,
    pub region_index: Option<usize>,
    pub dwell_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub print_metadata: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SweepSettings {
    pub tags: Option<Vec<String>>,
    pub min_freq: Option<u32>,
    pub max_freq: Option<u32>,
    pub freq_step: Option<f64>,
    pub min_pow: Option<i32>,
    pub max_pow: Option<i32>,
    pub pow_step: Option<i32>,
    pub passes: Option<u32>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub duration_secs: Option<u64>,
    pub database: Option<PathBuf>,
}

/// Optional JSON profile supplying defaults for the command line. Every field
/// may be omitted; explicit flags always win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub reader: ReaderSettings,
    pub sweep: SweepSettings,
    pub capture: CaptureSettings,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse profile {}", path.display()))
    }

    /// Loads `path` when given, otherwise an empty profile.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_profile_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "reader": {{ "antennas": [1, 2], "dwellMs": 250 }}, "sweep": {{ "freqStep": 0.5 }} }}"#
        )
        .unwrap();

        let profile = Profile::load(file.path()).unwrap();
        assert_eq!(profile.reader.antennas, Some(vec![1, 2]));
        assert_eq!(profile.reader.dwell_ms, Some(250));
        assert_eq!(profile.sweep.freq_step, Some(0.5));
        assert_eq!(profile.capture, CaptureSettings::default());
    }

    #[test]
    fn bad_profile_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = Profile::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse profile"));

        assert_eq!(Profile::load_optional(None).unwrap(), Profile::default());
    }
}
