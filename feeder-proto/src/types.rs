use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MINUTES_PER_DAY: i32 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    #[error("hour must be 0-23, got {0}")]
    HourOutOfRange(u8),
    #[error("minute must be 0-59, got {0}")]
    MinuteOutOfRange(u8),
    #[error("duration must be between 0.1 and 25.5 seconds, got {0}")]
    DurationOutOfRange(f32),
}

/// One scheduled feeding, as held in one slot of the feeder's table.
/// This is the canonical data model used by the wire codec, the session
/// client, and host applications.
///
/// The time of day is stored in UTC; conversion to the local wall clock
/// happens on read, using the system's current UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedingTime {
    /// Slot index on the feeder, 0-17
    pub slot: u8,

    /// Hour after midnight UTC, 24-hour format
    pub hour: u8,

    /// Minute after the full hour
    pub minute: u8,

    /// Dispense duration in tenths of a second
    pub deciseconds: u8,
}

impl FeedingTime {
    /// A feeding time as decoded from the wire, already in UTC.
    pub fn from_utc(slot: u8, hour: u8, minute: u8, deciseconds: u8) -> Self {
        Self {
            slot,
            hour,
            minute,
            deciseconds,
        }
    }

    /// A feeding time entered by the user in local wall-clock time.
    /// Converted to UTC using the system's current offset.
    pub fn from_local(slot: u8, hour: u8, minute: u8, seconds: f32) -> Result<Self, TimeError> {
        Self::from_local_at(slot, hour, minute, seconds, local_offset_minutes())
    }

    fn from_local_at(
        slot: u8,
        hour: u8,
        minute: u8,
        seconds: f32,
        offset_minutes: i32,
    ) -> Result<Self, TimeError> {
        if hour > 23 {
            return Err(TimeError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(TimeError::MinuteOutOfRange(minute));
        }
        let deciseconds = deciseconds_from_seconds(seconds)?;
        let utc = wrap_minutes(i32::from(hour) * 60 + i32::from(minute) - offset_minutes);
        Ok(Self {
            slot,
            hour: (utc / 60) as u8,
            minute: (utc % 60) as u8,
            deciseconds,
        })
    }

    /// Minutes since midnight UTC, the stored representation.
    pub fn utc_minutes(&self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }

    /// Minutes since local midnight under the given UTC offset, wrapped
    /// into [0, 1440). This is the sole sort key used for listing.
    pub fn local_minutes_at(&self, offset_minutes: i32) -> u16 {
        wrap_minutes(i32::from(self.utc_minutes()) + offset_minutes)
    }

    /// Minutes since local midnight under the system's current offset.
    pub fn local_minutes_since_midnight(&self) -> u16 {
        self.local_minutes_at(local_offset_minutes())
    }

    /// Dispense duration in seconds.
    pub fn seconds(&self) -> f32 {
        f32::from(self.deciseconds) / 10.0
    }

    /// Zero-padded `HH:MM` in local time, for display.
    pub fn format_local(&self) -> String {
        self.format_at(local_offset_minutes())
    }

    fn format_at(&self, offset_minutes: i32) -> String {
        let minutes = self.local_minutes_at(offset_minutes);
        format!("{:02}:{:02}", minutes / 60, minutes % 60)
    }
}

/// Convert a duration in seconds to wire deciseconds, rounding to the
/// nearest tenth. Durations outside 0.1-25.5 s are rejected.
pub fn deciseconds_from_seconds(seconds: f32) -> Result<u8, TimeError> {
    if !(0.1..=25.5).contains(&seconds) {
        return Err(TimeError::DurationOutOfRange(seconds));
    }
    Ok((seconds * 10.0).round() as u8)
}

/// Stable sort by local time of day, ascending. The UTC offset is
/// captured once so one listing never mixes offsets.
pub fn sort_by_local_time(times: &mut [FeedingTime]) {
    sort_by_local_time_at(times, local_offset_minutes());
}

pub fn sort_by_local_time_at(times: &mut [FeedingTime], offset_minutes: i32) {
    times.sort_by_key(|ft| ft.local_minutes_at(offset_minutes));
}

/// Wrap a minute count into [0, 1440), handling negative intermediates
/// from offset arithmetic (rollover at both midnight boundaries).
fn wrap_minutes(minutes: i32) -> u16 {
    minutes.rem_euclid(MINUTES_PER_DAY) as u16
}

fn local_offset_minutes() -> i32 {
    Local::now().offset().local_minus_utc() / 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_to_utc_to_local_round_trips_for_all_offsets() {
        for offset in -720..840 {
            for hour in 0..24u8 {
                for minute in 0..60u8 {
                    let ft = FeedingTime::from_local_at(0, hour, minute, 1.0, offset).unwrap();
                    assert_eq!(
                        ft.local_minutes_at(offset),
                        u16::from(hour) * 60 + u16::from(minute),
                        "offset {offset}, {hour:02}:{minute:02}"
                    );
                }
            }
        }
    }

    #[test]
    fn wraps_past_midnight_in_both_directions() {
        // UTC 23:50 with a +20 minute offset is local 00:10, next day
        let late = FeedingTime::from_utc(0, 23, 50, 10);
        assert_eq!(late.local_minutes_at(20), 10);

        // UTC 00:10 with a -20 minute offset is local 23:50, previous day
        let early = FeedingTime::from_utc(0, 0, 10, 10);
        assert_eq!(early.local_minutes_at(-20), 23 * 60 + 50);
    }

    #[test]
    fn late_utc_entry_sorts_as_early_morning() {
        let mut times = vec![
            FeedingTime::from_utc(0, 12, 0, 10),
            FeedingTime::from_utc(1, 23, 50, 10),
        ];
        sort_by_local_time_at(&mut times, 20);
        assert_eq!(times[0].slot, 1);
        assert_eq!(times[1].slot, 0);
    }

    #[test]
    fn sort_is_stable_for_equal_local_times() {
        let mut times = vec![
            FeedingTime::from_utc(5, 8, 30, 10),
            FeedingTime::from_utc(2, 8, 30, 20),
            FeedingTime::from_utc(9, 6, 0, 10),
        ];
        sort_by_local_time_at(&mut times, 120);
        assert_eq!(times[0].slot, 9);
        assert_eq!(times[1].slot, 5);
        assert_eq!(times[2].slot, 2);
    }

    #[test]
    fn duration_converts_and_validates() {
        assert_eq!(deciseconds_from_seconds(1.5).unwrap(), 15);
        assert_eq!(deciseconds_from_seconds(25.5).unwrap(), 255);
        assert_eq!(deciseconds_from_seconds(0.1).unwrap(), 1);
        assert!(matches!(
            deciseconds_from_seconds(25.6),
            Err(TimeError::DurationOutOfRange(_))
        ));
        assert!(matches!(
            deciseconds_from_seconds(0.05),
            Err(TimeError::DurationOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_wall_clock() {
        assert!(matches!(
            FeedingTime::from_local_at(0, 24, 0, 1.0, 0),
            Err(TimeError::HourOutOfRange(24))
        ));
        assert!(matches!(
            FeedingTime::from_local_at(0, 10, 60, 1.0, 0),
            Err(TimeError::MinuteOutOfRange(60))
        ));
    }

    #[test]
    fn formats_zero_padded_local_time() {
        let ft = FeedingTime::from_utc(0, 23, 50, 10);
        assert_eq!(ft.format_at(20), "00:10");
        assert_eq!(ft.format_at(0), "23:50");
        assert_eq!(ft.format_at(-80), "22:30");
    }
}
