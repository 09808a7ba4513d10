//! openXDA waveform model
//!
//! Data series and groups decoded from stored event blocks, the cycle
//! transforms that derive RMS and phase-angle series from them, harmonic
//! spectra, and the additional-field-value record.

pub mod additional_field;
pub mod codec;
pub mod data_group;
pub mod error;
pub mod harmonics;
pub mod series;
pub mod transform;
pub mod types;

pub use data_group::DataGroup;
pub use error::{ModelError, Result};
pub use harmonics::{HarmonicTable, PhasorResult};
pub use series::{DataPoint, DataSeries};
pub use transform::{to_vi_cycle_data_group, CycleDataGroup, VICycleDataGroup, VIDataGroup, ViSlot};
pub use types::{Channel, Event, Meter, SeriesInfo};
