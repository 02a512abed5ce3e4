//! HLS media playlist codec and origin playlist resolution.

pub mod model;
pub mod parser;
pub mod playlist;
pub mod writer;

pub use model::{ByteRange, Key, Manifest, PlaylistType, Segment};
pub use parser::parse_manifest;
pub use writer::render_manifest;
