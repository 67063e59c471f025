//! Media collaborators: file upload and speech-to-text.

pub mod transcribe;
pub mod upload;

pub use transcribe::TranscribeClient;
pub use upload::UploadClient;
