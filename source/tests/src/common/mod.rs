pub mod test_setup;

pub use test_setup::{wait_until, ManifestLoader, RecordingEvents};
