use std::net::Ipv4Addr;

/// Multicast group the feeder announces itself on
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(226, 1, 1, 1);

/// UDP port the beacon arrives on; its ASCII decimal payload is the
/// TCP port the feeder listens on
pub const BEACON_PORT: u16 = 5050;

/// Command opcodes of the TCP channel
pub const CMD_MANUAL: u8 = b'm';
pub const CMD_REFRESH: u8 = b'u';
pub const CMD_DELETE: u8 = b'd';
pub const CMD_CREATE: u8 = b'c';

/// Number of schedule slots in the feeder's table
pub const SLOT_COUNT: u8 = 18;

/// Wire length of one schedule record: hour, minute, deciseconds
pub const RECORD_LEN: usize = 3;

/// Dispense duration bounds, in tenths of a second
pub const MIN_DECISECONDS: u8 = 1;
pub const MAX_DECISECONDS: u8 = 255;
