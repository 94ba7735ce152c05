mod device;
mod failure;
mod geolocation;
mod velocity;

pub use device::DeviceEvaluator;
pub use failure::FailureEvaluator;
pub use geolocation::GeolocationEvaluator;
pub use velocity::VelocityEvaluator;
