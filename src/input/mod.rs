//! Frame-producing input modules.
//!
//! Each module satisfies the [`crate::module::InputModule`] contract: parse
//! its parameters at construction, spawn a producer thread on `start`, and
//! publish JPEG frames into its [`crate::channel::FrameChannel`] until the
//! stop flag is set. Device and codec specific capture (V4L2, cameras) is
//! deliberately not part of this crate.

pub mod file;
pub mod test_picture;

pub use file::FileInput;
pub use test_picture::TestPictureInput;
