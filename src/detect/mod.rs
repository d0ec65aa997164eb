mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::FixedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::RawDetections;
