pub mod chunk;
pub mod timestamp;

pub use chunk::{chunk_text, needs_chunking, reassemble, Chunk, ChunkConfig};
pub use timestamp::{
    extract_timestamps, parse_line, parse_script, validate_script, LineBody, PauseMarker,
    ScriptSegment, Timestamp,
};
