//! TCP pairing handshake: length-prefixed JSON frames over a plain stream.

pub mod framing;
mod handshake;
mod messages;
mod responder;

pub use handshake::TcpPairingHandshake;
pub use messages::{PairingAck, PairingFrame, PairingHello};
pub use responder::{PairingResponder, ResponderWorker};
