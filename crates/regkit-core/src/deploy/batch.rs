//! Atomic creation of the six-contract registry set.
//!
//! Implementations and wrappers are created in a fixed order inside one unit
//! of work. The dependent wrappers are initialized with the identity
//! wrapper's address. Any failing step rolls the backend back to the
//! checkpoint taken before the first creation, so either all six addresses
//! exist and are published or none of them do.

use tracing::info;

use super::chain::{ChainError, CreateRequest, CreationBackend};
use super::registry::{encode_published, RegistryDeployment, COMPONENTS};
use crate::domain::address::Address;
use crate::domain::error::{RegkitError, Result};
use crate::obs;

/// Wrapper artifact used for all three components.
pub const DEFAULT_WRAPPER: &str = "ERC1967Proxy";

/// Number of creation steps.
pub const STEP_COUNT: usize = 6;

/// Label of creation step `step` (1-based).
pub fn step_label(step: usize) -> String {
    let component = COMPONENTS[(step.saturating_sub(1) / 2).min(2)];
    if step % 2 == 1 {
        format!("{} implementation", component)
    } else {
        format!("{} proxy", component)
    }
}

type StepFailure = (usize, String, ChainError);

/// One batch creation run from a factory contract.
#[derive(Debug, Clone)]
pub struct BatchCreation {
    factory: Address,
    wrapper_artifact: String,
}

impl BatchCreation {
    pub fn new(factory: Address) -> Self {
        Self {
            factory,
            wrapper_artifact: DEFAULT_WRAPPER.to_string(),
        }
    }

    pub fn with_wrapper_artifact(mut self, name: impl Into<String>) -> Self {
        self.wrapper_artifact = name.into();
        self
    }

    pub fn factory(&self) -> &Address {
        &self.factory
    }

    /// Run all six creations and publish the result, or leave the backend
    /// exactly as it was.
    pub fn execute(&self, backend: &mut dyn CreationBackend) -> Result<RegistryDeployment> {
        let checkpoint = backend.checkpoint();

        match self.run(backend) {
            Ok(addresses) => {
                let mut deployment = RegistryDeployment::from_addresses(addresses);
                deployment.factory = Some(self.factory);
                info!(
                    "Created registry set from factory {} (identity proxy {})",
                    self.factory, deployment.identity.proxy
                );
                Ok(deployment)
            }
            Err((step, label, err)) => {
                backend.revert_to(checkpoint);
                obs::emit_creation_reverted(step, &err);
                Err(RegkitError::AtomicCreationFailed {
                    step,
                    label,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn run(&self, backend: &mut dyn CreationBackend) -> std::result::Result<[Address; 6], StepFailure> {
        let mut addresses = [Address::ZERO; 6];
        let mut identity_proxy = Address::ZERO;

        for (i, component) in COMPONENTS.into_iter().enumerate() {
            let impl_step = 2 * i + 1;
            let label = step_label(impl_step);
            let request = CreateRequest::implementation(&label, component.contract_name());
            let implementation = backend
                .create(&self.factory, &request)
                .map_err(|e| (impl_step, label.clone(), e))?;
            obs::emit_creation_step(impl_step, &label, &implementation);
            addresses[impl_step - 1] = implementation;

            let proxy_step = impl_step + 1;
            let label = step_label(proxy_step);
            let request = CreateRequest::wrapper(
                &label,
                &self.wrapper_artifact,
                implementation,
                component.init_call(&identity_proxy),
            );
            let proxy = backend
                .create(&self.factory, &request)
                .map_err(|e| (proxy_step, label.clone(), e))?;
            obs::emit_creation_step(proxy_step, &label, &proxy);
            addresses[proxy_step - 1] = proxy;

            if i == 0 {
                identity_proxy = proxy;
            }
        }

        backend
            .set_storage(&self.factory, encode_published(&addresses))
            .map_err(|e| (STEP_COUNT + 1, "publish".to_string(), e))?;

        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::chain::{create_address, MemoryChain};
    use crate::deploy::registry::{read_published, Component};

    fn setup(fail_at: Option<usize>) -> (MemoryChain, Address) {
        let mut chain = match fail_at {
            Some(n) => MemoryChain::new().with_failure_at(n),
            None => MemoryChain::new(),
        };
        let factory = chain.install_factory(&Address::new([0xde; 20]), 0);
        (chain, factory)
    }

    #[test]
    fn step_labels() {
        assert_eq!(step_label(1), "identity implementation");
        assert_eq!(step_label(2), "identity proxy");
        assert_eq!(step_label(5), "validation implementation");
        assert_eq!(step_label(6), "validation proxy");
    }

    #[test]
    fn successful_run_publishes_and_wires() {
        let (mut chain, factory) = setup(None);
        let deployment = BatchCreation::new(factory).execute(&mut chain).unwrap();

        let expected: Vec<Address> = (1..=6).map(|n| create_address(&factory, n)).collect();
        assert_eq!(deployment.addresses().to_vec(), expected);
        assert_eq!(read_published(&chain, &factory), Some(deployment.addresses()));
        assert!(deployment.is_wired());
        assert_eq!(deployment.factory, Some(factory));

        let reputation_proxy = deployment.proxy(Component::Reputation);
        let stored = chain.storage_of(&reputation_proxy).unwrap();
        assert_eq!(
            crate::deploy::abi::decode_address_arg(stored, 0),
            Some(deployment.proxy(Component::Identity))
        );
        assert_eq!(
            chain.code_at(&reputation_proxy).unwrap().delegate,
            Some(deployment.implementation(Component::Reputation))
        );
    }

    #[test]
    fn failure_reports_step_and_label() {
        let (mut chain, factory) = setup(Some(4));
        match BatchCreation::new(factory).execute(&mut chain) {
            Err(RegkitError::AtomicCreationFailed { step, label, reason }) => {
                assert_eq!(step, 4);
                assert_eq!(label, "reputation proxy");
                assert!(reason.contains("injected"));
            }
            other => panic!("expected AtomicCreationFailed, got {other:?}"),
        }
        assert_eq!(chain.contract_count(), 1);
        assert!(read_published(&chain, &factory).is_none());
    }

    #[test]
    fn failed_run_can_be_retried_at_same_addresses() {
        let (mut chain, factory) = setup(Some(3));
        assert!(BatchCreation::new(factory).execute(&mut chain).is_err());
        let deployment = BatchCreation::new(factory).execute(&mut chain).unwrap();
        assert_eq!(deployment.identity.implementation, create_address(&factory, 1));
    }
}
