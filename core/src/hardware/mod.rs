pub mod manager;
pub mod receiver;

#[cfg(test)]
pub(crate) mod mock;

pub use manager::{LeaseHandle, ResourceManager};
pub use receiver::{
    HealthState, ReceiverBackend, ReceiverDescriptor, ReceiverUnit, Role, SampleBlock,
};
