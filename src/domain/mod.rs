//! Domain layer: value objects, pure scoring and routing rules, and the ports
//! implemented by the infrastructure adapters.

pub mod charge;
pub mod ports;
pub mod risk;
pub mod routing;
pub mod subscription;
