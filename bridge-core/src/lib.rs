//! Keeps accessories in step with a home-automation controller's devices and
//! routes accessory commands back to the controller.

pub mod accessory;
pub mod bridge;
pub mod classifier;
pub mod error;
pub mod factory;
pub mod model;
pub mod reconciler;
pub mod registry;
pub mod router;
pub mod transport;
