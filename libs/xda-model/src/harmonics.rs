//! Harmonic spectra
//!
//! `SnapshotHarmonics.SpectralData` holds a JSON object keyed by harmonic
//! label (`H1`, `H2`, ...) with a magnitude and angle per entry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorResult {
    #[serde(rename = "Magnitude", alias = "magnitude")]
    pub magnitude: f64,
    #[serde(rename = "Angle", alias = "angle")]
    pub angle: f64,
}

pub fn parse_spectral_data(json: &str) -> Result<HashMap<String, PhasorResult>> {
    serde_json::from_str(json)
        .map_err(|e| ModelError::Serialization(format!("spectral data: {}", e)))
}

/// One channel's spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicSpectrum {
    pub channel: String,
    pub phasors: HashMap<String, PhasorResult>,
}

/// Spectra of one event, pivoted by harmonic number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonicTable {
    spectra: Vec<HarmonicSpectrum>,
}

impl HarmonicTable {
    /// Build from `(channel name, spectral JSON)` rows
    ///
    /// A repeated channel name keeps its first spectrum.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut spectra: Vec<HarmonicSpectrum> = Vec::new();
        for (channel, json) in rows {
            if spectra.iter().any(|s| s.channel == channel) {
                continue;
            }
            let phasors = parse_spectral_data(&json)?;
            spectra.push(HarmonicSpectrum { channel, phasors });
        }
        Ok(Self { spectra })
    }

    pub fn spectra(&self) -> &[HarmonicSpectrum] {
        &self.spectra
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Largest entry count of any channel
    pub fn harmonic_count(&self) -> usize {
        self.spectra
            .iter()
            .map(|s| s.phasors.len())
            .max()
            .unwrap_or(0)
    }

    /// Phasor of harmonic `n` (1-based) for each channel, in channel order
    pub fn row(&self, n: usize) -> impl Iterator<Item = Option<&PhasorResult>> + '_ {
        let label = harmonic_label(n);
        self.spectra
            .iter()
            .map(move |s| s.phasors.get(&label))
    }
}

pub fn harmonic_label(n: usize) -> String {
    format!("H{}", n)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_spectral_data() {
        let parsed =
            parse_spectral_data(r#"{"H1": {"Magnitude": 120.5, "Angle": -0.3}}"#).unwrap();
        assert_eq!(
            parsed["H1"],
            PhasorResult {
                magnitude: 120.5,
                angle: -0.3
            }
        );
        assert!(parse_spectral_data("[1, 2]").is_err());
    }

    #[test]
    fn test_pivot_fills_missing_entries_with_none() {
        let table = HarmonicTable::from_rows(vec![
            (
                "Voltage AN".to_string(),
                r#"{"H1": {"Magnitude": 1, "Angle": 0}, "H2": {"Magnitude": 2, "Angle": 0}, "H3": {"Magnitude": 3, "Angle": 0}}"#.to_string(),
            ),
            (
                "Current AN".to_string(),
                r#"{"H1": {"Magnitude": 4, "Angle": 0.5}}"#.to_string(),
            ),
        ])
        .unwrap();

        assert_eq!(table.harmonic_count(), 3);
        let h3: Vec<Option<&PhasorResult>> = table.row(3).collect();
        assert_eq!(h3[0].map(|p| p.magnitude), Some(3.0));
        assert!(h3[1].is_none());
    }

    #[test]
    fn test_duplicate_channel_keeps_first() {
        let table = HarmonicTable::from_rows(vec![
            ("V".to_string(), r#"{"H1": {"Magnitude": 1, "Angle": 0}}"#.to_string()),
            ("V".to_string(), "not json".to_string()),
        ])
        .unwrap();
        assert_eq!(table.spectra().len(), 1);
    }

    #[test]
    fn test_empty_table() {
        let table = HarmonicTable::from_rows(Vec::new()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.harmonic_count(), 0);
    }
}
