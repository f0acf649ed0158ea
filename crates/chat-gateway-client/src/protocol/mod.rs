//! Gateway protocol definitions
//!
//! Op codes, the message envelope, payloads, close codes, and decoded frames.

mod close_codes;
mod frame;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use frame::{Frame, FrameError};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, ReconnectPayload, ResumeAckPayload, ResumePayload};
