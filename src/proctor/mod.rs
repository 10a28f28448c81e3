pub mod bridge;
pub mod camera;
pub mod face;
pub mod frame;
pub mod sampler;
pub mod verification;

pub use bridge::BridgedCamera;
pub use camera::*;
pub use face::*;
pub use sampler::*;
pub use verification::*;
