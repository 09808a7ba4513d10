//! Cycle transforms
//!
//! Sliding one-cycle window over an instantaneous waveform, producing RMS,
//! fundamental phase angle and peak series.

use std::f64::consts::PI;

use tracing::debug;

use crate::data_group::DataGroup;
use crate::series::{DataPoint, DataSeries};
use crate::types::SeriesInfo;

/// Samples in one cycle of the nominal frequency, if at least one
pub fn samples_per_cycle(sample_rate: f64, frequency: f64) -> Option<usize> {
    if !sample_rate.is_finite() || !frequency.is_finite() || sample_rate <= 0.0 || frequency <= 0.0
    {
        return None;
    }
    let n = (sample_rate / frequency).round();
    if n >= 1.0 {
        Some(n as usize)
    } else {
        None
    }
}

/// Per-cycle series derived from one waveform
#[derive(Debug, Clone)]
pub struct CycleDataGroup {
    pub rms: DataSeries,
    /// Fundamental phase angle in radians
    pub phase: DataSeries,
    pub peak: DataSeries,
}

impl CycleDataGroup {
    /// Compute cycle data at `frequency` Hz
    ///
    /// Returns `None` when the waveform is too short to hold one cycle or has
    /// no usable sample rate.
    pub fn from_waveform(waveform: &DataSeries, frequency: f64) -> Option<Self> {
        if waveform.len() < 2 {
            return None;
        }
        let n = samples_per_cycle(waveform.sample_rate(), frequency)?;
        if waveform.len() < n {
            return None;
        }

        let (cos_table, sin_table): (Vec<f64>, Vec<f64>) = (0..n)
            .map(|k| {
                let theta = 2.0 * PI * k as f64 / n as f64;
                (theta.cos(), theta.sin())
            })
            .unzip();

        let windows = waveform.len() - n + 1;
        let mut rms = Vec::with_capacity(windows);
        let mut phase = Vec::with_capacity(windows);
        let mut peak = Vec::with_capacity(windows);

        for window in waveform.points.windows(n) {
            let time = window[0].time;
            let mut sum_sq = 0.0;
            let mut re = 0.0;
            let mut im = 0.0;
            let mut max_abs: f64 = 0.0;

            for (k, point) in window.iter().enumerate() {
                let x = point.value;
                sum_sq += x * x;
                re += x * cos_table[k];
                im -= x * sin_table[k];
                max_abs = max_abs.max(x.abs());
            }

            rms.push(DataPoint::new(time, (sum_sq / n as f64).sqrt()));
            phase.push(DataPoint::new(time, im.atan2(re)));
            peak.push(DataPoint::new(time, max_abs));
        }

        let info = waveform.series_info.clone();
        Some(Self {
            rms: DataSeries::with_points(info.clone(), rms),
            phase: DataSeries::with_points(info.clone(), phase),
            peak: DataSeries::with_points(info, peak),
        })
    }

    /// Name of the source channel
    pub fn channel_name(&self) -> Option<&str> {
        self.rms.name()
    }

    pub fn series_info(&self) -> Option<&SeriesInfo> {
        self.rms.series_info.as_ref()
    }
}

/// Voltage and current waveform slots, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViSlot {
    VA,
    VB,
    VC,
    VAB,
    VBC,
    VCA,
    IA,
    IB,
    IC,
    IR,
}

impl ViSlot {
    pub const ALL: [ViSlot; 10] = [
        ViSlot::VA,
        ViSlot::VB,
        ViSlot::VC,
        ViSlot::VAB,
        ViSlot::VBC,
        ViSlot::VCA,
        ViSlot::IA,
        ViSlot::IB,
        ViSlot::IC,
        ViSlot::IR,
    ];

    fn measurement_type(self) -> &'static str {
        match self {
            ViSlot::VA | ViSlot::VB | ViSlot::VC | ViSlot::VAB | ViSlot::VBC | ViSlot::VCA => {
                "Voltage"
            },
            ViSlot::IA | ViSlot::IB | ViSlot::IC | ViSlot::IR => "Current",
        }
    }

    fn phase(self) -> &'static str {
        match self {
            ViSlot::VA | ViSlot::IA => "AN",
            ViSlot::VB | ViSlot::IB => "BN",
            ViSlot::VC | ViSlot::IC => "CN",
            ViSlot::VAB => "AB",
            ViSlot::VBC => "BC",
            ViSlot::VCA => "CA",
            ViSlot::IR => "RES",
        }
    }

    fn matches(self, series: &DataSeries) -> bool {
        let Some(info) = &series.series_info else {
            return false;
        };
        let channel = &info.channel;
        channel.is_instantaneous()
            && channel
                .measurement_type
                .eq_ignore_ascii_case(self.measurement_type())
            && channel.phase.eq_ignore_ascii_case(self.phase())
    }
}

/// The voltage and current waveforms of a data group
///
/// The first matching series fills each slot.
#[derive(Debug, Clone, Default)]
pub struct VIDataGroup {
    slots: Vec<(ViSlot, DataSeries)>,
}

impl VIDataGroup {
    pub fn new(group: &DataGroup) -> Self {
        let slots = ViSlot::ALL
            .iter()
            .filter_map(|slot| {
                group
                    .data_series()
                    .iter()
                    .find(|s| slot.matches(s))
                    .map(|s| (*slot, s.clone()))
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, slot: ViSlot) -> Option<&DataSeries> {
        self.slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, series)| series)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ViSlot, DataSeries)> {
        self.slots.iter()
    }
}

/// Cycle data for each filled VI slot
#[derive(Debug, Clone, Default)]
pub struct VICycleDataGroup {
    groups: Vec<(ViSlot, CycleDataGroup)>,
}

impl VICycleDataGroup {
    pub fn get(&self, slot: ViSlot) -> Option<&CycleDataGroup> {
        self.groups
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, group)| group)
    }

    pub fn cycle_data_groups(&self) -> impl Iterator<Item = &CycleDataGroup> {
        self.groups.iter().map(|(_, group)| group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub fn to_vi_cycle_data_group(vi: &VIDataGroup, frequency: f64) -> VICycleDataGroup {
    let groups = vi
        .iter()
        .filter_map(|(slot, series)| {
            let cycles = CycleDataGroup::from_waveform(series, frequency);
            if cycles.is_none() {
                debug!("No cycle data for {:?} ({} samples)", slot, series.len());
            }
            cycles.map(|c| (*slot, c))
        })
        .collect();
    VICycleDataGroup { groups }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::types::Channel;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn channel(name: &str, kind: &str, phase: &str) -> Channel {
        Channel {
            id: 1,
            meter_id: 1,
            name: name.to_string(),
            measurement_type: kind.to_string(),
            measurement_characteristic: "Instantaneous".to_string(),
            phase: phase.to_string(),
        }
    }

    /// `cycles` cycles of `amplitude * cos(wt + phi)` at 60 Hz, 32 samples per cycle
    fn sine(name: &str, amplitude: f64, phi: f64, cycles: usize) -> DataSeries {
        let n = 32;
        let step_ns = 1e9 / (60.0 * n as f64);
        let points = (0..n * cycles)
            .map(|k| {
                let time = t0() + Duration::nanoseconds((k as f64 * step_ns).round() as i64);
                let theta = 2.0 * PI * k as f64 / n as f64;
                DataPoint::new(time, amplitude * (theta + phi).cos())
            })
            .collect();
        DataSeries::with_points(Some(SeriesInfo::new(channel(name, "Voltage", "AN"))), points)
    }

    #[test]
    fn test_samples_per_cycle() {
        assert_eq!(samples_per_cycle(1920.0, 60.0), Some(32));
        assert_eq!(samples_per_cycle(15360.0, 50.0), Some(307));
        assert_eq!(samples_per_cycle(0.0, 60.0), None);
        assert_eq!(samples_per_cycle(1920.0, 0.0), None);
        assert_eq!(samples_per_cycle(10.0, 60.0), None);
    }

    #[test]
    fn test_rms_and_phase_of_pure_sine() {
        let wave = sine("VA", 100.0, 0.5, 3);
        let cycles = CycleDataGroup::from_waveform(&wave, 60.0).unwrap();

        assert_eq!(cycles.rms.len(), wave.len() - 32 + 1);
        let expected_rms = 100.0 / 2f64.sqrt();
        assert!((cycles.rms.points[0].value - expected_rms).abs() < 1e-6);
        assert!((cycles.phase.points[0].value - 0.5).abs() < 1e-6);
        assert!((cycles.peak.points[0].value - 100.0).abs() < 1e-6);
        assert_eq!(cycles.rms.start_time(), wave.start_time());
        assert_eq!(cycles.channel_name(), Some("VA"));
    }

    #[test]
    fn test_short_waveform_yields_nothing() {
        let wave = sine("VA", 1.0, 0.0, 1);
        let short = DataSeries::with_points(wave.series_info.clone(), wave.points[..10].to_vec());
        assert!(CycleDataGroup::from_waveform(&short, 60.0).is_none());

        let single = DataSeries::with_points(None, wave.points[..1].to_vec());
        assert!(CycleDataGroup::from_waveform(&single, 60.0).is_none());
    }

    #[test]
    fn test_vi_group_selects_instantaneous_waveforms_in_slot_order() {
        let mut group = DataGroup::new();

        let mut ib = sine("IB", 5.0, 0.0, 2);
        ib.series_info = Some(SeriesInfo::new(channel("IB", "Current", "BN")));
        group.add(ib);

        let mut va_rms = sine("VA RMS", 1.0, 0.0, 2);
        va_rms.series_info.as_mut().unwrap().channel.measurement_characteristic =
            "RMS".to_string();
        group.add(va_rms);

        group.add(sine("VA", 100.0, 0.0, 2));

        let vi = VIDataGroup::new(&group);
        let slots: Vec<ViSlot> = vi.iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec![ViSlot::VA, ViSlot::IB]);
        assert_eq!(vi.get(ViSlot::VA).and_then(|s| s.name()), Some("VA"));

        let cycles = to_vi_cycle_data_group(&vi, 60.0);
        assert_eq!(cycles.len(), 2);
        let names: Vec<&str> = cycles
            .cycle_data_groups()
            .filter_map(|c| c.channel_name())
            .collect();
        assert_eq!(names, vec!["VA", "IB"]);
    }
}
