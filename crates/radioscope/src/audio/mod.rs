//! Audio subsystem
//!
//! Decoding, the real-time signal tap, and audio-flow monitoring.

pub mod decoder;
pub mod health;
pub mod presence;
pub mod source;
pub mod tap;

pub use decoder::{CodecInfo, SymphoniaSource};
pub use health::{FlowChange, StallMonitor};
pub use source::TappedSource;
pub use tap::{FeatureBuffers, SignalTap, TapHandle};
