mod utils;
mod media;
mod mixer;
mod muxer;
mod stream;
mod transport;

// Re-export commonly used types at crate root
pub use utils::*;
pub use media::*;

// Collaborator exports
pub use mixer::{Mixer, SampleWriter};
pub use muxer::{FlvMuxer, FlvMuxerConfig, FlvMuxerConfigBuilder, Muxer, encode_file_header, encode_tag_header};
pub use transport::{
    ConnectionConfig, ConnectionConfigBuilder, Readiness, ReadinessSignal, TcpConnection, Transport,
    resolve_address,
};

// Stream exports
pub use stream::*;
