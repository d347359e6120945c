mod kind;
mod sample;

pub use kind::*;
pub use sample::*;

// FLV tag types
pub const FLV_TAG_AUDIO: u8 = 8;
pub const FLV_TAG_VIDEO: u8 = 9;
