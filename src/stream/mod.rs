//! Live stream ingestion and republishing
//!
//! One [`StreamWorker`] per RTSP feed owns the connection, decodes frames
//! and overwrites the shared [`FrameSlot`]; any number of
//! [`FramePublisher`]s read the slot and turn it into a per-viewer frame
//! sequence.
//!
//! # Architecture
//!
//! ```text
//!   camera ──RTSP──► StreamWorker ──publish()──► FrameSlot (latest only)
//!                                                    │
//!                            ┌───────────────────────┼─────────────────┐
//!                            ▼                       ▼                 ▼
//!                     FramePublisher          FramePublisher    FramePublisher
//!                      viewer A                viewer B          viewer C
//! ```
//!
//! # Lossy by design
//!
//! The slot holds exactly one frame. A slow viewer misses intermediate
//! frames instead of building a backlog; live video wants freshness, not
//! completeness. `bytes::Bytes` keeps the fan-out zero-copy: every viewer
//! shares the same JPEG allocation.

pub mod ffmpeg;
pub mod frame;
pub mod publisher;
pub mod slot;
pub mod source;
pub mod worker;

pub use ffmpeg::FfmpegSource;
pub use frame::Frame;
pub use publisher::{multipart_chunk, multipart_content_type, FramePublisher};
pub use slot::FrameSlot;
pub use source::{FrameReader, FrameSource};
pub use worker::StreamWorker;
