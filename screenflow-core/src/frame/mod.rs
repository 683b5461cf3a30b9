//! Frame acquisition: transcoder child, MJPEG decode loop and the latest-frame slot.

pub mod decoder;
pub mod transcoder;
pub mod types;

pub use decoder::{
    FrameDecoder, FrameFeed, FramePublisher, FrameSubscription, decode_jpeg, frame_channel,
};
pub use transcoder::{Transcoder, TranscoderConfig, feed_loop};
pub use types::{Frame, FrameStats};
