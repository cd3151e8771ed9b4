//! Transport parameter encode/decode: a varint-tagged TLV list exchanged
//! during the handshake (RFC 9000 §18).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::VarInt;
use crate::packet::ConnectionId;

use super::error::TransportError;

mod id {
    pub const ORIGINAL_DESTINATION_CONNECTION_ID: u64 = 0x00;
    pub const MAX_IDLE_TIMEOUT: u64 = 0x01;
    pub const STATELESS_RESET_TOKEN: u64 = 0x02;
    pub const MAX_UDP_PAYLOAD_SIZE: u64 = 0x03;
    pub const INITIAL_MAX_DATA: u64 = 0x04;
    pub const INITIAL_MAX_STREAM_DATA_BIDI_LOCAL: u64 = 0x05;
    pub const INITIAL_MAX_STREAM_DATA_BIDI_REMOTE: u64 = 0x06;
    pub const INITIAL_MAX_STREAM_DATA_UNI: u64 = 0x07;
    pub const INITIAL_MAX_STREAMS_BIDI: u64 = 0x08;
    pub const INITIAL_MAX_STREAMS_UNI: u64 = 0x09;
    pub const ACK_DELAY_EXPONENT: u64 = 0x0a;
    pub const MAX_ACK_DELAY: u64 = 0x0b;
    pub const DISABLE_ACTIVE_MIGRATION: u64 = 0x0c;
    pub const PREFERRED_ADDRESS: u64 = 0x0d;
    pub const ACTIVE_CONNECTION_ID_LIMIT: u64 = 0x0e;
    pub const INITIAL_SOURCE_CONNECTION_ID: u64 = 0x0f;
    pub const RETRY_SOURCE_CONNECTION_ID: u64 = 0x10;
}

/// The negotiated transport parameter set (RFC 9000 §18.2). Preferred
/// address is carried opaquely since path migration to it is out of scope
/// beyond bookkeeping its presence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportParameters {
    pub original_destination_connection_id: Option<ConnectionId>,
    pub max_idle_timeout: u64,
    pub stateless_reset_token: Option<[u8; 16]>,
    pub max_udp_payload_size: u64,
    pub initial_max_data: u64,
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    pub ack_delay_exponent: u64,
    pub max_ack_delay: u64,
    pub disable_active_migration: bool,
    pub preferred_address: Option<Bytes>,
    pub active_connection_id_limit: u64,
    pub initial_source_connection_id: Option<ConnectionId>,
    pub retry_source_connection_id: Option<ConnectionId>,
}

impl TransportParameters {
    /// RFC 9000 §18.2 defaults for parameters an endpoint may omit.
    pub fn defaults() -> Self {
        Self {
            max_udp_payload_size: 65527,
            ack_delay_exponent: 3,
            max_ack_delay: 25,
            active_connection_id_limit: 2,
            ..Default::default()
        }
    }

    pub fn encode(&self, out: &mut BytesMut) -> Result<(), TransportError> {
        if let Some(cid) = &self.original_destination_connection_id {
            put_bytes(out, id::ORIGINAL_DESTINATION_CONNECTION_ID, cid.as_slice())?;
        }
        put_varint_param(out, id::MAX_IDLE_TIMEOUT, self.max_idle_timeout)?;
        if let Some(token) = self.stateless_reset_token {
            put_bytes(out, id::STATELESS_RESET_TOKEN, &token)?;
        }
        put_varint_param(out, id::MAX_UDP_PAYLOAD_SIZE, self.max_udp_payload_size)?;
        put_varint_param(out, id::INITIAL_MAX_DATA, self.initial_max_data)?;
        put_varint_param(out, id::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL, self.initial_max_stream_data_bidi_local)?;
        put_varint_param(out, id::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE, self.initial_max_stream_data_bidi_remote)?;
        put_varint_param(out, id::INITIAL_MAX_STREAM_DATA_UNI, self.initial_max_stream_data_uni)?;
        put_varint_param(out, id::INITIAL_MAX_STREAMS_BIDI, self.initial_max_streams_bidi)?;
        put_varint_param(out, id::INITIAL_MAX_STREAMS_UNI, self.initial_max_streams_uni)?;
        put_varint_param(out, id::ACK_DELAY_EXPONENT, self.ack_delay_exponent)?;
        put_varint_param(out, id::MAX_ACK_DELAY, self.max_ack_delay)?;
        if self.disable_active_migration {
            put_bytes(out, id::DISABLE_ACTIVE_MIGRATION, &[])?;
        }
        if let Some(addr) = &self.preferred_address {
            put_bytes(out, id::PREFERRED_ADDRESS, addr)?;
        }
        put_varint_param(out, id::ACTIVE_CONNECTION_ID_LIMIT, self.active_connection_id_limit)?;
        if let Some(cid) = &self.initial_source_connection_id {
            put_bytes(out, id::INITIAL_SOURCE_CONNECTION_ID, cid.as_slice())?;
        }
        if let Some(cid) = &self.retry_source_connection_id {
            put_bytes(out, id::RETRY_SOURCE_CONNECTION_ID, cid.as_slice())?;
        }
        Ok(())
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, TransportError> {
        let mut params = Self::default();
        while buf.has_remaining() {
            let key = VarInt::decode(&mut buf).map_err(|_| TransportError::MalformedTransportParameters)?.into_inner();
            let len = VarInt::decode(&mut buf).map_err(|_| TransportError::MalformedTransportParameters)?.as_usize();
            if buf.remaining() < len {
                return Err(TransportError::MalformedTransportParameters);
            }
            let value = buf.copy_to_bytes(len);
            params.apply(key, value)?;
        }
        Ok(params)
    }

    fn apply(&mut self, key: u64, mut value: Bytes) -> Result<(), TransportError> {
        let read_varint = |buf: &mut Bytes| -> Result<u64, TransportError> {
            VarInt::decode(buf).map(VarInt::into_inner).map_err(|_| TransportError::MalformedTransportParameters)
        };
        match key {
            id::ORIGINAL_DESTINATION_CONNECTION_ID => {
                self.original_destination_connection_id = Some(ConnectionId::from_slice(&value));
            }
            id::MAX_IDLE_TIMEOUT => self.max_idle_timeout = read_varint(&mut value)?,
            id::STATELESS_RESET_TOKEN => {
                if value.len() != 16 {
                    return Err(TransportError::MalformedTransportParameters);
                }
                let mut token = [0u8; 16];
                token.copy_from_slice(&value);
                self.stateless_reset_token = Some(token);
            }
            id::MAX_UDP_PAYLOAD_SIZE => self.max_udp_payload_size = read_varint(&mut value)?,
            id::INITIAL_MAX_DATA => self.initial_max_data = read_varint(&mut value)?,
            id::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL => self.initial_max_stream_data_bidi_local = read_varint(&mut value)?,
            id::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE => self.initial_max_stream_data_bidi_remote = read_varint(&mut value)?,
            id::INITIAL_MAX_STREAM_DATA_UNI => self.initial_max_stream_data_uni = read_varint(&mut value)?,
            id::INITIAL_MAX_STREAMS_BIDI => self.initial_max_streams_bidi = read_varint(&mut value)?,
            id::INITIAL_MAX_STREAMS_UNI => self.initial_max_streams_uni = read_varint(&mut value)?,
            id::ACK_DELAY_EXPONENT => self.ack_delay_exponent = read_varint(&mut value)?,
            id::MAX_ACK_DELAY => self.max_ack_delay = read_varint(&mut value)?,
            id::DISABLE_ACTIVE_MIGRATION => self.disable_active_migration = true,
            id::PREFERRED_ADDRESS => self.preferred_address = Some(value),
            id::ACTIVE_CONNECTION_ID_LIMIT => self.active_connection_id_limit = read_varint(&mut value)?,
            id::INITIAL_SOURCE_CONNECTION_ID => self.initial_source_connection_id = Some(ConnectionId::from_slice(&value)),
            id::RETRY_SOURCE_CONNECTION_ID => self.retry_source_connection_id = Some(ConnectionId::from_slice(&value)),
            _ => {} // unknown parameters are ignored per RFC 9000 §18.1
        }
        Ok(())
    }
}

fn put_varint_param(out: &mut BytesMut, key: u64, value: u64) -> Result<(), TransportError> {
    let encoded = VarInt::from_u64(value).map_err(|_| TransportError::MalformedTransportParameters)?;
    put_bytes(out, key, &{
        let mut tmp = BytesMut::new();
        encoded.encode(&mut tmp).map_err(|_| TransportError::MalformedTransportParameters)?;
        tmp
    })
}

fn put_bytes(out: &mut BytesMut, key: u64, value: &[u8]) -> Result<(), TransportError> {
    VarInt::from_u64(key)
        .map_err(|_| TransportError::MalformedTransportParameters)?
        .encode(out)
        .map_err(|_| TransportError::MalformedTransportParameters)?;
    VarInt::from_u64(value.len() as u64)
        .map_err(|_| TransportError::MalformedTransportParameters)?
        .encode(out)
        .map_err(|_| TransportError::MalformedTransportParameters)?;
    out.put_slice(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_representative_parameter_set() {
        let mut params = TransportParameters::defaults();
        params.initial_max_data = 1_000_000;
        params.initial_max_streams_bidi = 100;
        params.active_connection_id_limit = 4;
        params.initial_source_connection_id = Some(ConnectionId::from_slice(&[1, 2, 3, 4]));

        let mut buf = BytesMut::new();
        params.encode(&mut buf).unwrap();
        let decoded = TransportParameters::decode(&buf).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn unknown_parameter_ids_are_ignored() {
        let mut buf = BytesMut::new();
        VarInt::from_u64(0xff00).unwrap().encode(&mut buf).unwrap();
        VarInt::from_u64(3).unwrap().encode(&mut buf).unwrap();
        buf.put_slice(&[1, 2, 3]);
        assert!(TransportParameters::decode(&buf).is_ok());
    }
}
