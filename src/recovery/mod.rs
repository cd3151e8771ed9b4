//! L6 — send controller: packet-number spaces, RTT estimation, loss
//! detection, New Reno congestion control, pacing, and flow control, tied
//! together into one per-connection scheduler for outgoing packets.

pub mod congestion;
pub mod controller;
pub mod flow_control;
pub mod loss;
pub mod pacer;
pub mod pn_space;
pub mod rtt;

pub use congestion::NewRenoController;
pub use controller::{assemble, estimate_frame_size, Outgoing, SendController, MIN_DATAGRAM_SIZE};
pub use flow_control::{FlowController, RecvLimit, SendLimit};
pub use loss::{detect_lost_packets, is_persistent_congestion, LossDetectionResult};
pub use pacer::Pacer;
pub use pn_space::{PnSpaceState, SentPacket};
pub use rtt::RttEstimator;
