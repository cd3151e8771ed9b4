//! Connection orchestrator: the sans-io entry points an external event
//! loop drives (`on_datagram`, `on_tls_secret`, `on_handshake_done`,
//! `open_stream`, `close`), wiring together the crypto, packet, frame,
//! stream, and recovery layers.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::RngCore;
use tracing::{debug, instrument, trace, warn};

use crate::crypto::{LevelCryptographer, Role};
use crate::error::{QuicheError, QuicheResult, TransportErrorCode};
use crate::frame::Frame;
use crate::packet::{
    self, ConnectionId, DecodedPacket, Header, Level, LongHeader, LongPacketType, PacketNumberSpace, VERSION_1,
};
use crate::recovery::{assemble, estimate_frame_size, SendController};
use crate::stream::{classify, compose, is_peer_initiated, BidiStream, Directionality, StreamScheduler};

use super::cid::{CidManager, StatelessResetToken};
use super::path::PathValidator;
use super::state::ConnectionState;
use super::transport_params::TransportParameters;

const DEFAULT_MAX_STREAMS: u64 = 100;

struct CryptoLevels {
    initial: Option<LevelCryptographer>,
    handshake: Option<LevelCryptographer>,
    zero_rtt: Option<LevelCryptographer>,
    application: Option<LevelCryptographer>,
}

impl CryptoLevels {
    fn get(&self, level: Level) -> Option<&LevelCryptographer> {
        match level {
            Level::Initial => self.initial.as_ref(),
            Level::Handshake => self.handshake.as_ref(),
            Level::ZeroRtt => self.zero_rtt.as_ref(),
            Level::Application => self.application.as_ref(),
        }
    }

    fn slot(&mut self, level: Level) -> &mut Option<LevelCryptographer> {
        match level {
            Level::Initial => &mut self.initial,
            Level::Handshake => &mut self.handshake,
            Level::ZeroRtt => &mut self.zero_rtt,
            Level::Application => &mut self.application,
        }
    }
}

/// A request queued by [`Connection::open_stream`] while waiting for the
/// peer to raise the relevant `MAX_STREAMS` limit.
struct PendingOpen {
    dir: Directionality,
}

/// Outgoing CRYPTO data for one packet-number space: handshake bytes have
/// no flow control and are never abandoned, so this is a plain ordered
/// byte queue rather than the full [`crate::stream::SendStream`] machinery.
#[derive(Default)]
struct CryptoSendBuffer {
    chunks: VecDeque<(u64, Bytes)>,
    write_offset: u64,
    send_offset: u64,
}

impl CryptoSendBuffer {
    fn push(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let offset = self.write_offset;
        self.write_offset += data.len() as u64;
        self.chunks.push_back((offset, data));
    }

    /// Emits one `CRYPTO` frame covering up to `max_len` bytes of whatever
    /// is next in send order, or `None` once everything queued has gone
    /// out.
    fn emit(&mut self, max_len: usize) -> Option<Frame> {
        let (offset, data) = self.chunks.front()?;
        let offset = *offset;
        let within = (self.send_offset - offset) as usize;
        let available = (data.len() - within).min(max_len);
        if available == 0 {
            return None;
        }
        let piece = data.slice(within..within + available);
        let piece_offset = self.send_offset;
        self.send_offset += available as u64;
        if within + available == data.len() {
            self.chunks.pop_front();
        }
        Some(Frame::Crypto { offset: piece_offset, data: piece })
    }
}

#[derive(Default)]
struct CryptoSendBuffers {
    initial: CryptoSendBuffer,
    handshake: CryptoSendBuffer,
    application: CryptoSendBuffer,
}

impl CryptoSendBuffers {
    fn get_mut(&mut self, space: PacketNumberSpace) -> &mut CryptoSendBuffer {
        match space {
            PacketNumberSpace::Initial => &mut self.initial,
            PacketNumberSpace::Handshake => &mut self.handshake,
            PacketNumberSpace::Application => &mut self.application,
        }
    }
}

pub struct Connection {
    role: Role,
    state: ConnectionState,
    crypto: CryptoLevels,
    pub send: SendController,
    scheduler: StreamScheduler,
    streams: HashMap<u64, BidiStream>,
    next_local_bidi_seq: u64,
    next_local_uni_seq: u64,
    peer_max_streams_bidi: u64,
    peer_max_streams_uni: u64,
    local_max_streams_bidi: u64,
    local_max_streams_uni: u64,
    pending_opens: VecDeque<PendingOpen>,
    /// Stream ids resolved out of `pending_opens` since the last
    /// [`Connection::take_opened_streams`], in resolution order. A queued
    /// `open_stream` has no callback to invoke directly (see the spec's
    /// redesign note on callbacks re-entering the owner); the caller drains
    /// this instead of being called back into.
    opened_streams: Vec<u64>,
    cids: CidManager,
    /// This endpoint's own connection id, put in the `scid` field of every
    /// long header this connection sends.
    local_cid: ConnectionId,
    /// The connection id this endpoint currently addresses the peer with.
    peer_cid: ConnectionId,
    pub local_params: TransportParameters,
    pub peer_params: Option<TransportParameters>,
    pub path: PathValidator,
    idle_timeout: Duration,
    last_activity: Instant,
    close_reason: Option<(TransportErrorCode, String)>,
    close_packets_sent: u8,
    /// Outgoing CRYPTO bytes handed to us by the caller's TLS driver, one
    /// queue per packet-number space.
    crypto_send: CryptoSendBuffers,
    /// Set once on the server's `on_handshake_done`; cleared the first time
    /// `poll_send` manages to fit the frame into a 1-RTT packet.
    handshake_done_pending: bool,
    /// RESET_STREAM / STOP_SENDING frames queued by [`Connection::stream_reset`],
    /// [`Connection::stream_stop_sending`], and incoming STOP_SENDING, ahead
    /// of ordinary stream data in send priority.
    pending_control: VecDeque<Frame>,
}

impl Connection {
    pub fn new(
        role: Role,
        now: Instant,
        peer_addr: SocketAddr,
        dcid: &ConnectionId,
        local_cid: &ConnectionId,
        local_params: TransportParameters,
        static_reset_key: Vec<u8>,
    ) -> QuicheResult<Self> {
        let initial = LevelCryptographer::install_initial(dcid.as_slice(), role)?;
        let idle_timeout = if local_params.max_idle_timeout > 0 {
            Duration::from_millis(local_params.max_idle_timeout)
        } else {
            Duration::from_secs(30)
        };
        Ok(Self {
            role,
            state: ConnectionState::Connecting,
            crypto: CryptoLevels { initial: Some(initial), handshake: None, zero_rtt: None, application: None },
            send: SendController::new(now, Duration::from_millis(25), local_params.initial_max_data, 0),
            scheduler: StreamScheduler::new(),
            streams: HashMap::new(),
            next_local_bidi_seq: 0,
            next_local_uni_seq: 0,
            peer_max_streams_bidi: 0,
            peer_max_streams_uni: 0,
            local_max_streams_bidi: DEFAULT_MAX_STREAMS,
            local_max_streams_uni: DEFAULT_MAX_STREAMS,
            pending_opens: VecDeque::new(),
            opened_streams: Vec::new(),
            cids: CidManager::new(static_reset_key, 8, 2),
            local_cid: local_cid.clone(),
            peer_cid: dcid.clone(),
            local_params,
            peer_params: None,
            path: PathValidator::new(peer_addr),
            idle_timeout,
            last_activity: now,
            close_reason: None,
            close_packets_sent: 0,
            crypto_send: CryptoSendBuffers::default(),
            handshake_done_pending: false,
            pending_control: VecDeque::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Installs keys for `level` under the cipher suite the TLS handshake
    /// negotiated, enabling that level's encryption.
    pub fn on_tls_secret(
        &mut self,
        level: Level,
        suite: crate::crypto::CipherSuite,
        read_secret: &[u8],
        write_secret: &[u8],
    ) -> QuicheResult<()> {
        let cryptographer = LevelCryptographer::install_secret(suite, read_secret, write_secret)?;
        *self.crypto.slot(level) = Some(cryptographer);
        debug!(?level, "installed keys");
        Ok(())
    }

    /// Transitions Connecting -> Connected. The caller (driving TLS) calls
    /// this once the handshake completes; a server additionally queues
    /// HANDSHAKE_DONE (left to the caller's next `poll_send`, since that is
    /// an ordinary 1-RTT frame).
    pub fn on_handshake_done(&mut self) {
        self.state = ConnectionState::Connected;
        self.send.on_handshake_confirmed();
        if self.role == Role::Server {
            self.handshake_done_pending = true;
        }
        debug!("handshake complete");
    }

    /// Hands this connection outgoing CRYPTO bytes produced by the
    /// caller's TLS driver, to be emitted at the front of the next
    /// `poll_send` for `space`.
    pub fn queue_crypto(&mut self, space: PacketNumberSpace, data: Bytes) {
        self.crypto_send.get_mut(space).push(data);
    }

    /// Applies the peer's transport parameters once decoded from their
    /// CRYPTO stream: raises this connection's send-side flow and stream
    /// limits, and tightens the idle timeout to the lower of both sides.
    pub fn on_peer_transport_params(&mut self, params: TransportParameters) {
        self.send.flow.on_max_data(params.initial_max_data);
        self.peer_max_streams_bidi = params.initial_max_streams_bidi;
        self.peer_max_streams_uni = params.initial_max_streams_uni;
        self.cids.set_peer_limit(params.active_connection_id_limit);
        if params.max_idle_timeout > 0 {
            let peer_timeout = Duration::from_millis(params.max_idle_timeout);
            self.idle_timeout = self.idle_timeout.min(peer_timeout);
        }
        self.drain_pending_opens();
        self.peer_params = Some(params);
    }

    #[instrument(skip(self, datagram))]
    pub fn on_datagram(&mut self, now: Instant, src_addr: SocketAddr, datagram: &mut [u8]) -> QuicheResult<()> {
        let mut offset = 0usize;
        let mut any_processed = false;
        while offset < datagram.len() {
            let remaining = &mut datagram[offset..];
            let crypto = &self.crypto;
            let send = &self.send;
            match packet::decode_one(remaining, 8, |level| crypto.get(level), |space| send.largest_received_signed(space)) {
                Ok(decoded) => {
                    offset += decoded.consumed;
                    any_processed = true;
                    self.on_packet(now, src_addr, decoded)?;
                }
                Err(e) if remaining.len() >= 21 => {
                    if self.cids.matches_any_reset_token(remaining) {
                        debug!("stateless reset token matched, draining");
                        self.state = ConnectionState::Draining;
                    } else {
                        warn!(error = %e, "undecryptable packet, not a stateless reset");
                    }
                    return Ok(());
                }
                Err(e) => {
                    trace!(error = %e, "dropping malformed packet");
                    return Ok(());
                }
            }
        }
        if any_processed {
            self.last_activity = now;
        }
        Ok(())
    }

    fn on_packet(&mut self, now: Instant, src_addr: SocketAddr, decoded: DecodedPacket) -> QuicheResult<()> {
        let space = decoded.level.space();
        let mut ack_eliciting = false;
        let mut buf = decoded.payload;
        while !buf.is_empty() {
            let frame = Frame::decode(&mut buf)?;
            if frame.is_ack_eliciting() {
                ack_eliciting = true;
            }
            self.on_frame(now, src_addr, space, frame)?;
        }
        self.send.on_packet_received(space, decoded.packet_number, ack_eliciting);
        Ok(())
    }

    fn on_frame(&mut self, now: Instant, src_addr: SocketAddr, space: PacketNumberSpace, frame: Frame) -> QuicheResult<()> {
        match frame {
            Frame::Padding { .. } | Frame::Ping => {}
            Frame::Ack { ranges, ack_delay, .. } => {
                let delay = Duration::from_micros(ack_delay << self.local_params.ack_delay_exponent);
                self.send.on_ack_received(space, &ranges, delay, now);
            }
            Frame::Stream { stream_id, offset, fin, data } => self.on_stream_frame(stream_id, offset, data, fin)?,
            Frame::ResetStream { stream_id, error_code, final_size } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.recv.on_reset(error_code, final_size)?;
                }
            }
            Frame::StopSending { stream_id, error_code } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    if let Some(final_size) = stream.on_stop_sending()? {
                        self.pending_control.push_back(Frame::ResetStream { stream_id, error_code, final_size });
                    }
                }
            }
            Frame::MaxData { max } => self.send.flow.on_max_data(max),
            Frame::MaxStreamData { stream_id, max } => self.send.flow.on_max_stream_data(stream_id, max),
            Frame::MaxStreamsBidi { max } => {
                self.peer_max_streams_bidi = self.peer_max_streams_bidi.max(max);
                self.drain_pending_opens();
            }
            Frame::MaxStreamsUni { max } => {
                self.peer_max_streams_uni = self.peer_max_streams_uni.max(max);
                self.drain_pending_opens();
            }
            Frame::NewConnectionId { .. } | Frame::RetireConnectionId { .. } => {
                // Remote CID pool bookkeeping lives with the path/routing layer
                // this crate leaves to the caller's dispatcher.
            }
            Frame::PathChallenge { data } => {
                // Mirrored back as PATH_RESPONSE by the caller's next poll_send;
                // queueing egress frames directly is out of scope here.
                trace!(?data, "path challenge received");
            }
            Frame::PathResponse { data } => {
                self.path.on_path_response(data, src_addr)?;
            }
            Frame::ConnectionCloseTransport { .. } | Frame::ConnectionCloseApplication { .. } => {
                self.state = ConnectionState::Draining;
            }
            Frame::HandshakeDone => self.on_handshake_done(),
            Frame::Crypto { .. } | Frame::NewToken { .. } => {} // handed to the TLS driver one layer up
            Frame::Datagram { .. } => {}
            Frame::StreamsBlockedBidi { .. } | Frame::StreamsBlockedUni { .. } => {}
            Frame::DataBlocked { .. } | Frame::StreamDataBlocked { .. } => {}
        }
        Ok(())
    }

    fn on_stream_frame(&mut self, stream_id: u64, offset: u64, data: Bytes, fin: bool) -> QuicheResult<()> {
        let highest = offset + data.len() as u64;
        if is_peer_initiated(stream_id, self.role) {
            self.accept_peer_stream(stream_id)?;
        }
        self.send.flow.on_stream_bytes_received(stream_id, highest)?;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Ok(());
        };
        stream.recv.on_data(offset, data, fin)?;
        Ok(())
    }

    fn accept_peer_stream(&mut self, stream_id: u64) -> QuicheResult<()> {
        if self.streams.contains_key(&stream_id) {
            return Ok(());
        }
        let (_, dir, seq) = classify(stream_id);
        let limit = match dir {
            Directionality::Bidi => self.local_max_streams_bidi,
            Directionality::Uni => self.local_max_streams_uni,
        };
        if seq >= limit {
            return Err(QuicheError::transport(TransportErrorCode::StreamLimitError, "peer exceeded stream limit"));
        }
        let send_max = self.peer_params.as_ref().map_or(0, |p| p.initial_max_stream_data_bidi_remote);
        let recv_max = self.local_params.initial_max_stream_data_bidi_local;
        let stream = match dir {
            Directionality::Bidi => BidiStream::new(send_max, recv_max),
            Directionality::Uni => BidiStream::recv_only(recv_max),
        };
        self.send.flow.register_recv_stream(stream_id, recv_max);
        self.send.flow.register_send_stream(stream_id, send_max);
        self.streams.insert(stream_id, stream);
        self.scheduler.mark_active(stream_id);
        Ok(())
    }

    /// Allocates the next local stream id of directionality `dir` if the
    /// peer's stream-count limit allows it; otherwise queues the request,
    /// resolved the next time a `MAX_STREAMS` frame raises that limit and
    /// surfaced through [`Connection::take_opened_streams`].
    pub fn open_stream(&mut self, dir: Directionality) -> Option<u64> {
        let (seq, limit) = match dir {
            Directionality::Bidi => (self.next_local_bidi_seq, self.peer_max_streams_bidi),
            Directionality::Uni => (self.next_local_uni_seq, self.peer_max_streams_uni),
        };
        if seq >= limit {
            self.pending_opens.push_back(PendingOpen { dir });
            return None;
        }
        Some(self.allocate_stream(dir))
    }

    fn allocate_stream(&mut self, dir: Directionality) -> u64 {
        let seq = match dir {
            Directionality::Bidi => {
                let seq = self.next_local_bidi_seq;
                self.next_local_bidi_seq += 1;
                seq
            }
            Directionality::Uni => {
                let seq = self.next_local_uni_seq;
                self.next_local_uni_seq += 1;
                seq
            }
        };
        let stream_id = compose(self.role, dir, seq);
        let send_max = self.peer_params.as_ref().map_or(0, |p| p.initial_max_stream_data_bidi_remote);
        let recv_max = self.local_params.initial_max_stream_data_bidi_local;
        let stream = match dir {
            Directionality::Bidi => BidiStream::new(send_max, recv_max),
            Directionality::Uni => BidiStream::send_only(send_max),
        };
        self.send.flow.register_send_stream(stream_id, send_max);
        self.send.flow.register_recv_stream(stream_id, recv_max);
        self.streams.insert(stream_id, stream);
        self.scheduler.mark_active(stream_id);
        stream_id
    }

    fn drain_pending_opens(&mut self) {
        while let Some(pending) = self.pending_opens.front() {
            let (seq, limit) = match pending.dir {
                Directionality::Bidi => (self.next_local_bidi_seq, self.peer_max_streams_bidi),
                Directionality::Uni => (self.next_local_uni_seq, self.peer_max_streams_uni),
            };
            if seq >= limit {
                break;
            }
            let dir = self.pending_opens.pop_front().unwrap().dir;
            let stream_id = self.allocate_stream(dir);
            self.opened_streams.push(stream_id);
        }
    }

    /// Drains the stream ids resolved from a queued [`Connection::open_stream`]
    /// call since the last drain, in the order they were resolved.
    pub fn take_opened_streams(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.opened_streams)
    }

    pub fn stream_write(&mut self, stream_id: u64, data: Bytes, fin: bool) -> QuicheResult<()> {
        let stream = self.streams.get_mut(&stream_id).ok_or_else(|| {
            QuicheError::transport(TransportErrorCode::StreamStateError, "unknown stream")
        })?;
        stream.send.write(data, fin)?;
        self.scheduler.mark_active(stream_id);
        Ok(())
    }

    pub fn stream_read(&mut self, stream_id: u64) -> Option<Bytes> {
        self.streams.get_mut(&stream_id)?.recv.read()
    }

    /// Abandons the local application's send side of `stream_id`, queuing
    /// a RESET_STREAM ahead of ordinary stream data in the next
    /// `poll_send`. A no-op if the send half was already reset.
    pub fn stream_reset(&mut self, stream_id: u64, error_code: u64) -> QuicheResult<()> {
        let stream = self.streams.get_mut(&stream_id).ok_or_else(|| {
            QuicheError::transport(TransportErrorCode::StreamStateError, "unknown stream")
        })?;
        if let Some(final_size) = stream.reset_send() {
            self.pending_control.push_back(Frame::ResetStream { stream_id, error_code, final_size });
        }
        Ok(())
    }

    /// Asks the peer to stop sending on `stream_id`, queuing a
    /// STOP_SENDING ahead of ordinary stream data. Does not by itself
    /// change this endpoint's recv-side state — that waits on the
    /// RESET_STREAM the peer sends in response.
    pub fn stream_stop_sending(&mut self, stream_id: u64, error_code: u64) -> QuicheResult<()> {
        if !self.streams.contains_key(&stream_id) {
            return Err(QuicheError::transport(TransportErrorCode::StreamStateError, "unknown stream"));
        }
        self.pending_control.push_back(Frame::StopSending { stream_id, error_code });
        Ok(())
    }

    pub fn issue_new_cids(&mut self, rng: &mut dyn RngCore) -> Vec<(u64, ConnectionId, StatelessResetToken)> {
        self.cids.refill(rng)
    }

    /// Schedules a CONNECTION_CLOSE and transitions to Closing. Idempotent:
    /// a connection already Closing/Draining/Closed is left alone.
    pub fn close(&mut self, code: TransportErrorCode, reason: impl Into<String>) {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Draining | ConnectionState::Closed) {
            return;
        }
        self.close_reason = Some((code, reason.into()));
        self.state = ConnectionState::Closing;
    }

    /// One CONNECTION_CLOSE per received packet while Closing, capped at
    /// three total to bound the amplification an attacker-triggered close
    /// loop could cause (RFC 9000 §10.2).
    pub fn next_close_frame(&mut self) -> Option<Frame> {
        if self.state != ConnectionState::Closing || self.close_packets_sent >= 3 {
            return None;
        }
        let (code, reason) = self.close_reason.clone()?;
        self.close_packets_sent += 1;
        Some(Frame::ConnectionCloseTransport { error_code: code.code(), frame_type: 0, reason: Bytes::from(reason) })
    }

    pub fn on_idle_timeout_check(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_activity) >= self.idle_timeout {
            self.state = ConnectionState::Closed;
            true
        } else {
            false
        }
    }

    pub fn set_idle_timeout(&mut self, d: Duration) {
        self.idle_timeout = d;
    }

    /// Drains whatever this connection has ready to send into one UDP
    /// datagram's worth of bytes (at most `budget`), trying each
    /// packet-number space in urgency order (Initial, then Handshake, then
    /// Application) until one produces a packet. Returns an empty `Vec`
    /// when there is nothing to send right now — a sans-io connection is
    /// idle between events far more often than it has work to do.
    #[instrument(skip(self))]
    pub fn poll_send(&mut self, now: Instant, budget: usize) -> Vec<u8> {
        if matches!(self.state, ConnectionState::Draining | ConnectionState::Closed) {
            return Vec::new();
        }
        for space in PacketNumberSpace::ALL {
            if let Some(datagram) = self.poll_send_space(now, space, budget) {
                return datagram;
            }
        }
        Vec::new()
    }

    fn level_for_space(space: PacketNumberSpace) -> Level {
        match space {
            PacketNumberSpace::Initial => Level::Initial,
            PacketNumberSpace::Handshake => Level::Handshake,
            PacketNumberSpace::Application => Level::Application,
        }
    }

    /// Assembles and encrypts one packet for `space`, in the priority
    /// order §4.7 lays out: a pending CONNECTION_CLOSE first if closing,
    /// else CRYPTO, then HANDSHAKE_DONE, then RESET_STREAM/STOP_SENDING,
    /// then ordinary ACK/control/stream data via [`assemble`], then
    /// padding an Initial packet out to the full budget. Returns `None` if
    /// keys for `level` aren't installed yet, or there is nothing to send.
    fn poll_send_space(&mut self, now: Instant, space: PacketNumberSpace, budget: usize) -> Option<Vec<u8>> {
        let level = Self::level_for_space(space);
        self.crypto.get(level)?;

        if self.state == ConnectionState::Closing {
            let frame = self.next_close_frame()?;
            return Some(self.finish_packet(now, space, level, vec![frame], false));
        }

        let mut frames = Vec::new();
        let mut used = 0usize;
        let mut ack_eliciting = false;

        while let Some(frame) = self.crypto_send.get_mut(space).emit(budget.saturating_sub(used)) {
            used += estimate_frame_size(&frame);
            ack_eliciting = true;
            frames.push(frame);
        }

        if space == PacketNumberSpace::Application && self.handshake_done_pending {
            let frame = Frame::HandshakeDone;
            if used + estimate_frame_size(&frame) <= budget {
                used += estimate_frame_size(&frame);
                ack_eliciting = true;
                frames.push(frame);
                self.handshake_done_pending = false;
            }
        }

        if space == PacketNumberSpace::Application {
            while let Some(next) = self.pending_control.front() {
                let size = estimate_frame_size(next);
                if used + size > budget {
                    break;
                }
                used += size;
                ack_eliciting = true;
                frames.push(self.pending_control.pop_front().expect("checked non-empty above"));
            }
        }

        // Wire `ack_delay` value (units of 2^ack_delay_exponent
        // microseconds); this controller doesn't track per-packet receipt
        // timestamps to report measured delay, so it reports none.
        let ack_delay = 0u64;
        let remaining = budget.saturating_sub(used);
        let send = &mut self.send;
        let scheduler = &mut self.scheduler;
        let streams = &mut self.streams;
        let outgoing = assemble(
            send,
            space,
            ack_delay,
            scheduler,
            |stream_id, max_len| {
                let stream = streams.get_mut(&stream_id)?;
                stream.send.emit(max_len).map(|(offset, data, fin)| Frame::Stream { stream_id, offset, fin, data })
            },
            remaining,
        );
        used += outgoing.frames.iter().map(estimate_frame_size).sum::<usize>();
        ack_eliciting |= outgoing.ack_eliciting;
        frames.extend(outgoing.frames);

        // RFC 9000 §14.1: datagrams carrying an Initial packet are padded
        // to the full budget, both to reach the minimum datagram size and
        // to satisfy the server's anti-amplification limit.
        if space == PacketNumberSpace::Initial && !frames.is_empty() && used < budget {
            frames.push(Frame::Padding { len: budget - used });
        }

        if frames.is_empty() {
            return None;
        }

        Some(self.finish_packet(now, space, level, frames, ack_eliciting))
    }

    fn build_header(&self, space: PacketNumberSpace) -> Header {
        match space {
            PacketNumberSpace::Initial => Header::Initial(LongHeader {
                packet_type: LongPacketType::Initial,
                version: VERSION_1,
                dcid: self.peer_cid.clone(),
                scid: self.local_cid.clone(),
                token: None,
                remainder_len: 0,
            }),
            PacketNumberSpace::Handshake => Header::Handshake(LongHeader {
                packet_type: LongPacketType::Handshake,
                version: VERSION_1,
                dcid: self.peer_cid.clone(),
                scid: self.local_cid.clone(),
                token: None,
                remainder_len: 0,
            }),
            PacketNumberSpace::Application => Header::Short { dcid: self.peer_cid.clone() },
        }
    }

    fn finish_packet(
        &mut self,
        now: Instant,
        space: PacketNumberSpace,
        level: Level,
        frames: Vec<Frame>,
        ack_eliciting: bool,
    ) -> Vec<u8> {
        let mut plaintext = Vec::new();
        for frame in &frames {
            frame.encode(&mut plaintext).expect("frame always encodes");
        }

        let pn = self.send.next_pn(space);
        let largest_acked = self.send.largest_acked(space);
        let header = self.build_header(space);

        let crypto = self.crypto.get(level).expect("caller checked keys are installed");
        let mut out = Vec::new();
        packet::encode_one(&mut out, header, pn, largest_acked, &plaintext, crypto)
            .expect("packet encodes under installed keys and a budget-bounded payload");

        let bytes = out.len();
        self.send.record_sent_at(space, pn, now, bytes, ack_eliciting, frames);
        if ack_eliciting {
            self.last_activity = now;
        }
        out
    }

    /// Driven by the caller's timer wheel: expires the connection on an
    /// idle timeout, gives up an outstanding path-validation challenge past
    /// its deadline, and — if any packet-number space still has data in
    /// flight — counts a PTO expiry and re-arms every non-terminal stream
    /// so the next `poll_send` retransmits.
    pub fn on_timeout(&mut self, now: Instant) {
        if self.on_idle_timeout_check(now) {
            debug!("idle timeout expired");
            return;
        }
        if self.path.expire(now) {
            debug!("path validation challenge expired without a response");
        }
        let any_in_flight = PacketNumberSpace::ALL.iter().any(|&space| self.send.has_in_flight(space));
        if any_in_flight {
            self.send.on_pto_expired();
            for (&stream_id, stream) in self.streams.iter() {
                if !stream.send.is_terminal() {
                    self.scheduler.mark_active(stream_id);
                }
            }
        }
    }
}
