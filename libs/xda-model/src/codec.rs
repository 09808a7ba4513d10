//! Stored time-domain block codec
//!
//! Layout of one `ChannelData.TimeDomainData` value, gzip-compressed,
//! little-endian:
//!
//! ```text
//! i32  sample_count
//! i64  ticks[sample_count]      100 ns ticks since 0001-01-01T00:00:00
//! repeat until end:
//!     i32  channel_id
//!     f64  values[sample_count]
//! ```

use std::io::{Read, Write};

use chrono::{DateTime, NaiveDateTime};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{ModelError, Result};

/// Ticks between 0001-01-01 and the Unix epoch
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Ticks per second (one tick = 100 ns)
pub const TICKS_PER_SECOND: i64 = 10_000_000;

pub fn ticks_to_datetime(ticks: i64) -> Option<NaiveDateTime> {
    let unix_ticks = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

/// Sub-tick precision is truncated
pub fn datetime_to_ticks(time: NaiveDateTime) -> i64 {
    let utc = time.and_utc();
    utc.timestamp() * TICKS_PER_SECOND
        + i64::from(utc.timestamp_subsec_nanos() / 100)
        + UNIX_EPOCH_TICKS
}

/// One decoded block: a shared time axis and the values of each channel
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDomainBlock {
    pub times: Vec<NaiveDateTime>,
    pub channels: Vec<(i64, Vec<f64>)>,
}

fn take<const N: usize>(buf: &mut &[u8], what: &str) -> Result<[u8; N]> {
    if buf.len() < N {
        return Err(ModelError::decode(format!(
            "truncated block while reading {}",
            what
        )));
    }
    let (head, rest) = buf.split_at(N);
    *buf = rest;
    head.try_into()
        .map_err(|_| ModelError::decode(format!("bad slice for {}", what)))
}

/// Decode one compressed block
pub fn decode_time_domain(data: &[u8]) -> Result<TimeDomainBlock> {
    let mut raw = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut raw)
        .map_err(|e| ModelError::decode(format!("gzip: {}", e)))?;

    let mut buf: &[u8] = &raw;
    let count = i32::from_le_bytes(take::<4>(&mut buf, "sample count")?);
    if count < 0 {
        return Err(ModelError::decode(format!(
            "negative sample count {}",
            count
        )));
    }
    let count = count as usize;

    let mut times = Vec::with_capacity(count);
    for _ in 0..count {
        let ticks = i64::from_le_bytes(take::<8>(&mut buf, "timestamp")?);
        let time = ticks_to_datetime(ticks)
            .ok_or_else(|| ModelError::decode(format!("timestamp out of range: {}", ticks)))?;
        times.push(time);
    }

    let mut channels = Vec::new();
    while !buf.is_empty() {
        let channel_id = i32::from_le_bytes(take::<4>(&mut buf, "channel id")?);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(f64::from_le_bytes(take::<8>(&mut buf, "sample value")?));
        }
        channels.push((i64::from(channel_id), values));
    }

    Ok(TimeDomainBlock { times, channels })
}

/// Encode one block; every channel must have one value per timestamp
pub fn encode_time_domain(times: &[NaiveDateTime], channels: &[(i64, &[f64])]) -> Result<Vec<u8>> {
    let count = i32::try_from(times.len())
        .map_err(|_| ModelError::validation("too many samples for one block"))?;

    let mut raw = Vec::with_capacity(4 + times.len() * 8 * (1 + channels.len()));
    raw.extend_from_slice(&count.to_le_bytes());
    for time in times {
        raw.extend_from_slice(&datetime_to_ticks(*time).to_le_bytes());
    }

    for (channel_id, values) in channels {
        if values.len() != times.len() {
            return Err(ModelError::validation(format!(
                "channel {} has {} values for {} timestamps",
                channel_id,
                values.len(),
                times.len()
            )));
        }
        let id = i32::try_from(*channel_id)
            .map_err(|_| ModelError::validation(format!("channel id {} out of range", channel_id)))?;
        raw.extend_from_slice(&id.to_le_bytes());
        for value in values.iter() {
            raw.extend_from_slice(&value.to_le_bytes());
        }
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}
