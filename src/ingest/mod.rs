//! Upload ingestion.
//!
//! Turns the bytes of a single uploaded image into the model input:
//! - Validate the upload (JPEG only, non-empty)
//! - Decode to 8-bit RGB
//! - Resize to the square model input and normalize to [0, 1], channel-major
//!
//! Nothing here touches disk or keeps the upload beyond the returned tensor.

mod normalize;
pub mod upload;

pub use normalize::{preprocess, InputTensor};
pub(crate) use normalize::preprocess_to;
pub use upload::{decode_upload, validate_upload};
