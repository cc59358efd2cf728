//! Wire format for log records

pub mod frame;

pub use frame::{decode, decode_payload, decode_with_limit, encode, FrameCodec, MAX_FRAME_SIZE, PREFIX_LEN};
