//! Data groups
//!
//! A set of series captured together, typically the channels of one event.

use chrono::NaiveDateTime;
use tracing::warn;

use crate::codec::decode_time_domain;
use crate::error::Result;
use crate::series::{DataPoint, DataSeries};
use crate::types::{Meter, SeriesInfo};

#[derive(Debug, Clone, Default)]
pub struct DataGroup {
    series: Vec<DataSeries>,
}

impl DataGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, series: DataSeries) {
        self.series.push(series);
    }

    pub fn data_series(&self) -> &[DataSeries] {
        &self.series
    }

    pub fn into_data_series(self) -> Vec<DataSeries> {
        self.series
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Earliest sample time of any series
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.series.iter().filter_map(|s| s.start_time()).min()
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.series.iter().filter_map(|s| s.end_time()).max()
    }

    /// Decode the stored blocks of one event into a group
    ///
    /// Channel ids resolve against the meter's channels; series for channels
    /// the meter does not own are skipped.
    pub fn from_data(meter: &Meter, blobs: &[Vec<u8>]) -> Result<Self> {
        let mut group = DataGroup::new();

        for blob in blobs {
            let block = decode_time_domain(blob)?;

            for (channel_id, values) in block.channels {
                let Some(channel) = meter.channel(channel_id) else {
                    warn!(
                        "Meter {} has no channel {}, skipping series",
                        meter.asset_key, channel_id
                    );
                    continue;
                };

                let points = block
                    .times
                    .iter()
                    .zip(values)
                    .map(|(time, value)| DataPoint::new(*time, value))
                    .collect();

                group.add(DataSeries::with_points(
                    Some(SeriesInfo::new(channel.clone())),
                    points,
                ));
            }
        }

        Ok(group)
    }
}
