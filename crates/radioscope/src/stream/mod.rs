//! Stream handling
//!
//! HTTP/ICY connection plumbing and timed-metadata parsing.

pub mod icy;
pub mod metadata;

pub use icy::{ChunkReader, IcyDemuxer, IcyHeaders};
pub use metadata::{common_title, MetadataItem, MetadataKey};
