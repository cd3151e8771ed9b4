//! RFC 9114 §7.2.4.1 / RFC 9204 §5's SETTINGS parameters: a small
//! identifier/value registry exchanged once on each side's control stream
//! before any other traffic. Unknown identifiers (greasing, or parameters
//! from a future extension) are preserved, not dropped, per RFC 9114 §7.2.4
//! — an endpoint that doesn't recognize one simply ignores it rather than
//! treating it as an error.

use std::collections::HashMap;

use bytes::{Buf, BufMut};

use crate::codec::VarInt;

use super::error::H3Error;

pub mod id {
    pub const QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
    pub const MAX_FIELD_SECTION_SIZE: u64 = 0x06;
    pub const QPACK_BLOCKED_STREAMS: u64 = 0x07;
}

/// Identifiers reserved by RFC 9114 §7.2.4.1 that would indicate a
/// grease/HTTP-2-only setting leaking onto an HTTP/3 connection.
const RESERVED: &[u64] = &[0x02, 0x03, 0x04, 0x05];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub qpack_max_table_capacity: u64,
    pub max_field_section_size: Option<u64>,
    pub qpack_blocked_streams: u64,
    /// Any identifier this build doesn't interpret, kept for forwarding or
    /// diagnostics rather than silently discarded.
    pub unknown: HashMap<u64, u64>,
}

impl Settings {
    pub fn encode(&self, out: &mut impl BufMut) -> Result<(), H3Error> {
        let mut pairs = Vec::new();
        if self.qpack_max_table_capacity > 0 {
            pairs.push((id::QPACK_MAX_TABLE_CAPACITY, self.qpack_max_table_capacity));
        }
        if let Some(v) = self.max_field_section_size {
            pairs.push((id::MAX_FIELD_SECTION_SIZE, v));
        }
        if self.qpack_blocked_streams > 0 {
            pairs.push((id::QPACK_BLOCKED_STREAMS, self.qpack_blocked_streams));
        }
        for (k, v) in &self.unknown {
            pairs.push((*k, *v));
        }
        for (k, v) in pairs {
            VarInt::from_u64(k).map_err(|_| H3Error::FrameError)?.encode(out).map_err(|_| H3Error::FrameError)?;
            VarInt::from_u64(v).map_err(|_| H3Error::FrameError)?.encode(out).map_err(|_| H3Error::FrameError)?;
        }
        Ok(())
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self, H3Error> {
        let mut settings = Settings::default();
        let mut seen = std::collections::HashSet::new();
        while payload.has_remaining() {
            let id = VarInt::decode(&mut payload).map_err(|_| H3Error::FrameError)?.into_inner();
            let value = VarInt::decode(&mut payload).map_err(|_| H3Error::FrameError)?.into_inner();
            if RESERVED.contains(&id) {
                return Err(H3Error::SettingsError);
            }
            if !seen.insert(id) {
                return Err(H3Error::SettingsError);
            }
            match id {
                id::QPACK_MAX_TABLE_CAPACITY => settings.qpack_max_table_capacity = value,
                id::MAX_FIELD_SECTION_SIZE => settings.max_field_section_size = Some(value),
                id::QPACK_BLOCKED_STREAMS => settings.qpack_blocked_streams = value,
                other => {
                    settings.unknown.insert(other, value);
                }
            }
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_settings_round_trip() {
        let settings = Settings {
            qpack_max_table_capacity: 4096,
            max_field_section_size: Some(16384),
            qpack_blocked_streams: 16,
            unknown: HashMap::new(),
        };
        let mut out = Vec::new();
        settings.encode(&mut out).unwrap();
        assert_eq!(Settings::decode(&out).unwrap(), settings);
    }

    #[test]
    fn reserved_identifier_is_rejected() {
        let mut out = Vec::new();
        VarInt::from_u32(0x02).encode(&mut out).unwrap();
        VarInt::from_u32(1).encode(&mut out).unwrap();
        assert_eq!(Settings::decode(&out), Err(H3Error::SettingsError));
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut out = Vec::new();
        VarInt::from_u32(id::QPACK_BLOCKED_STREAMS as u32).encode(&mut out).unwrap();
        VarInt::from_u32(1).encode(&mut out).unwrap();
        VarInt::from_u32(id::QPACK_BLOCKED_STREAMS as u32).encode(&mut out).unwrap();
        VarInt::from_u32(2).encode(&mut out).unwrap();
        assert_eq!(Settings::decode(&out), Err(H3Error::SettingsError));
    }

    #[test]
    fn unrecognized_identifier_is_preserved_not_dropped() {
        let mut out = Vec::new();
        VarInt::from_u32(0x1234).encode(&mut out).unwrap();
        VarInt::from_u32(7).encode(&mut out).unwrap();
        let decoded = Settings::decode(&out).unwrap();
        assert_eq!(decoded.unknown.get(&0x1234), Some(&7));
    }
}
