//! Checkpoint artifact loading
//!
//! The gateway consumes trimmed weight files produced offline. Their
//! contents are opaque here: this module only finds them, identifies the
//! format and reports their size, so a backend can bind them to a device.

mod detect;

pub use detect::{detect_checkpoint, CheckpointFormat, CheckpointSource};
