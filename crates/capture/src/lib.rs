//! Session capture: cookie channel merging, network event correlation and
//! capture artifact persistence.

pub mod correlate;
pub mod merge;
pub mod writer;

pub use correlate::{correlate, replay, JarProvider, VisitContext};
pub use merge::merge_channels;
pub use writer::{archive_slug, CaptureWriter};
