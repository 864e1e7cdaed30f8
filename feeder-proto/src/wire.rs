//! Wire codec for the feeder's TCP channel. Commands are a single
//! opcode byte followed by fixed-arity single-byte arguments; the
//! schedule response is a stream of 3-byte records ending when the
//! device closes the connection.

use crate::protocol::{CMD_CREATE, CMD_DELETE, CMD_MANUAL, CMD_REFRESH, RECORD_LEN};
use crate::types::{sort_by_local_time, FeedingTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the dispenser immediately for `deciseconds` tenths of a second
    ManualFeed { deciseconds: u8 },
    /// Request the full current schedule
    Refresh,
    /// Remove the entry at `slot`
    Delete { slot: u8 },
    /// Add or replace the entry at the time's slot
    Create(FeedingTime),
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::ManualFeed { deciseconds } => vec![CMD_MANUAL, *deciseconds],
            Command::Refresh => vec![CMD_REFRESH],
            Command::Delete { slot } => vec![CMD_DELETE, *slot],
            Command::Create(ft) => vec![CMD_CREATE, ft.slot, ft.hour, ft.minute, ft.deciseconds],
        }
    }

    /// Whether the device streams the full schedule back after this
    /// command. Everything but manual feed does.
    pub fn expects_schedule(&self) -> bool {
        !matches!(self, Command::ManualFeed { .. })
    }
}

/// Decode a schedule stream into feeding times, sorted by local time of
/// day ascending.
///
/// Records are `(hour, minute, deciseconds)` in UTC. The slot index is
/// the record's position in the stream; records with an out-of-range
/// hour or minute mark empty device slots and are dropped, but still
/// consume their position. A trailing partial record means the stream
/// ended mid-record and is discarded, not an error.
pub fn decode_schedule(bytes: &[u8]) -> Vec<FeedingTime> {
    let mut times: Vec<FeedingTime> = bytes
        .chunks_exact(RECORD_LEN)
        .enumerate()
        .filter_map(|(slot, record)| {
            let (hour, minute, deciseconds) = (record[0], record[1], record[2]);
            if hour >= 24 || minute >= 60 {
                return None;
            }
            Some(FeedingTime::from_utc(slot as u8, hour, minute, deciseconds))
        })
        .collect();
    sort_by_local_time(&mut times);
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_manual_feed() {
        assert_eq!(
            Command::ManualFeed { deciseconds: 15 }.encode(),
            vec![b'm', 15]
        );
        assert_eq!(
            Command::ManualFeed { deciseconds: 255 }.encode(),
            vec![b'm', 255]
        );
    }

    #[test]
    fn encodes_refresh_and_delete() {
        assert_eq!(Command::Refresh.encode(), vec![b'u']);
        assert_eq!(Command::Delete { slot: 7 }.encode(), vec![b'd', 7]);
    }

    #[test]
    fn encodes_create() {
        let ft = FeedingTime::from_utc(4, 9, 5, 20);
        assert_eq!(Command::Create(ft).encode(), vec![b'c', 4, 9, 5, 20]);
    }

    #[test]
    fn only_manual_feed_skips_the_schedule_response() {
        assert!(!Command::ManualFeed { deciseconds: 3 }.expects_schedule());
        assert!(Command::Refresh.expects_schedule());
        assert!(Command::Delete { slot: 0 }.expects_schedule());
        assert!(Command::Create(FeedingTime::from_utc(0, 1, 2, 3)).expects_schedule());
    }

    fn slot(times: &[FeedingTime], slot: u8) -> Option<&FeedingTime> {
        times.iter().find(|ft| ft.slot == slot)
    }

    #[test]
    fn invalid_records_are_dropped_but_keep_their_slot() {
        let bytes = [8, 30, 5, 12, 0, 20, 30, 0, 1, 9, 0, 10];
        let times = decode_schedule(&bytes);
        assert_eq!(times.len(), 3);
        assert_eq!(slot(&times, 0).unwrap().utc_minutes(), 8 * 60 + 30);
        assert_eq!(slot(&times, 1).unwrap().deciseconds, 20);
        assert!(slot(&times, 2).is_none(), "hour 30 marks an empty slot");
        assert_eq!(slot(&times, 3).unwrap().utc_minutes(), 9 * 60);
    }

    #[test]
    fn invalid_minute_is_dropped_too() {
        let times = decode_schedule(&[10, 60, 5]);
        assert!(times.is_empty());
    }

    #[test]
    fn partial_trailing_record_ends_the_stream() {
        let bytes = [8, 30, 5, 12, 0, 20, 17, 45];
        let times = decode_schedule(&bytes);
        assert_eq!(times.len(), 2);
        assert!(slot(&times, 0).is_some());
        assert!(slot(&times, 1).is_some());
    }

    #[test]
    fn empty_stream_decodes_to_empty_schedule() {
        assert!(decode_schedule(&[]).is_empty());
    }
}
