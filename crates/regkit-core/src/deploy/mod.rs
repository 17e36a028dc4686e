//! Registry set creation and the deployed-address surface.

pub mod abi;
pub mod batch;
pub mod chain;
pub mod registry;

pub use batch::{step_label, BatchCreation, DEFAULT_WRAPPER, STEP_COUNT};
pub use chain::{create_address, ChainError, Checkpoint, Contract, CreateRequest, CreationBackend, MemoryChain};
pub use registry::{
    read_published, Component, ComponentDeployment, RegistryDeployment, COMPONENTS, DEPLOYMENT_FILE,
    REGISTRY_VERSION,
};
