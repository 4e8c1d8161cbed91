pub mod connector;
pub mod decoder;
pub mod session;

pub use connector::{Connector, FrameConnection, WsConnector};
pub use decoder::{DecoderStats, FrameDecoder};
pub use session::{SessionState, SessionStats, TransportSession};
