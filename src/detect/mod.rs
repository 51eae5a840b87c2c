mod backend;
mod backends;
mod normalize;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptStep, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use normalize::DetectionNormalizer;
pub use result::{BoundingBox, Detection, RawDetection};
