//! L7 connection-layer error kind.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TransportError {
    #[error("transport parameters TLV is malformed or truncated")]
    MalformedTransportParameters,
    #[error("peer's active_connection_id_limit leaves no CID to issue")]
    CidPoolExhausted,
    #[error("no PATH_CHALLENGE outstanding for this PATH_RESPONSE")]
    UnsolicitedPathResponse,
    #[error("stream id violates the peer's negotiated stream limit")]
    StreamLimitExceeded,
}
