pub mod adjust;
pub mod codec;
pub mod encode;
pub mod error;
pub mod estimate;
pub mod ffmpeg;
pub mod format;
pub mod media;
pub mod prefs;
pub mod preset;
pub mod session;
pub mod settings;
pub mod sidecar_api;
pub mod transcode;

pub use codec::{SupportedCodecs, VideoCodec};
pub use encode::EncodeConfig;
pub use media::SourceMedia;
