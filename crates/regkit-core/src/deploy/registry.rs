//! The deployed-address surface: six addresses, their wiring, and
//! `deployment.json`.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::abi::{decode_address_arg, encode_address, encode_call, encode_proxy_constructor, to_hex, WORD};
use super::chain::CreationBackend;
use crate::domain::address::Address;
use crate::domain::error::{RegkitError, Result};
use crate::fs::write_atomic;

/// Default file name for a persisted deployment.
pub const DEPLOYMENT_FILE: &str = "deployment.json";

/// Version identifier reported by the registry set.
pub const REGISTRY_VERSION: &str = "1.0.0";

/// One of the three registries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Identity,
    Reputation,
    Validation,
}

/// Components in creation order.
pub const COMPONENTS: [Component; 3] = [
    Component::Identity,
    Component::Reputation,
    Component::Validation,
];

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::Identity => "identity",
            Component::Reputation => "reputation",
            Component::Validation => "validation",
        }
    }

    /// Contract name of the implementation.
    pub fn contract_name(&self) -> &'static str {
        match self {
            Component::Identity => "IdentityRegistry",
            Component::Reputation => "ReputationRegistry",
            Component::Validation => "ValidationRegistry",
        }
    }

    /// Initializer signature run through the wrapper.
    pub fn initializer(&self) -> &'static str {
        match self {
            Component::Identity => "initialize()",
            Component::Reputation | Component::Validation => "initialize(address)",
        }
    }

    /// Whether the initializer takes the identity wrapper's address.
    pub fn references_identity(&self) -> bool {
        !matches!(self, Component::Identity)
    }

    /// Initializer call data given the identity wrapper's address.
    pub fn init_call(&self, identity_proxy: &Address) -> Vec<u8> {
        if self.references_identity() {
            encode_call(self.initializer(), &[*identity_proxy])
        } else {
            encode_call(self.initializer(), &[])
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Component {
    type Err = RegkitError;

    fn from_str(s: &str) -> Result<Self> {
        COMPONENTS
            .iter()
            .find(|c| c.name() == s)
            .copied()
            .ok_or_else(|| RegkitError::Config(format!("unknown component: {}", s)))
    }
}

/// Addresses of one component plus the call its wrapper was initialized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDeployment {
    pub implementation: Address,
    pub proxy: Address,
    /// `0x`-prefixed initializer call data.
    pub init_call: String,
}

impl ComponentDeployment {
    pub fn new(implementation: Address, proxy: Address, init_call: &[u8]) -> Self {
        Self {
            implementation,
            proxy,
            init_call: to_hex(init_call),
        }
    }

    pub fn init_call_bytes(&self) -> Result<Vec<u8>> {
        let trimmed = crate::hash::strip_hex_prefix(&self.init_call);
        hex::decode(trimmed).map_err(|e| {
            RegkitError::InvalidManifest(format!("init_call is not hex: {}", e))
        })
    }

    /// `abi.encode(implementation, init_call)`, what the wrapper was constructed with.
    pub fn constructor_args(&self) -> Result<Vec<u8>> {
        Ok(encode_proxy_constructor(
            &self.implementation,
            &self.init_call_bytes()?,
        ))
    }
}

/// The full six-address set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDeployment {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    pub identity: ComponentDeployment,
    pub reputation: ComponentDeployment,
    pub validation: ComponentDeployment,
}

impl RegistryDeployment {
    /// Build from six addresses in creation order
    /// (implementation, wrapper) × (identity, reputation, validation),
    /// deriving the initializer calls from the identity wrapper.
    pub fn from_addresses(addresses: [Address; 6]) -> Self {
        let identity_proxy = addresses[1];
        let part = |c: Component, i: usize| {
            ComponentDeployment::new(addresses[i], addresses[i + 1], &c.init_call(&identity_proxy))
        };
        Self {
            version: REGISTRY_VERSION.to_string(),
            chain_id: None,
            factory: None,
            identity: part(Component::Identity, 0),
            reputation: part(Component::Reputation, 2),
            validation: part(Component::Validation, 4),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn component(&self, component: Component) -> &ComponentDeployment {
        match component {
            Component::Identity => &self.identity,
            Component::Reputation => &self.reputation,
            Component::Validation => &self.validation,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = (Component, &ComponentDeployment)> {
        COMPONENTS.into_iter().map(move |c| (c, self.component(c)))
    }

    pub fn implementation(&self, component: Component) -> Address {
        self.component(component).implementation
    }

    pub fn proxy(&self, component: Component) -> Address {
        self.component(component).proxy
    }

    /// The identity wrapper a dependent wrapper was initialized with, read
    /// back from its stored call data. `None` for the identity component.
    pub fn identity_registry_of(&self, component: Component) -> Option<Address> {
        if !component.references_identity() {
            return None;
        }
        let call = self.component(component).init_call_bytes().ok()?;
        decode_address_arg(&call, 0)
    }

    /// All six addresses in creation order.
    pub fn addresses(&self) -> [Address; 6] {
        [
            self.identity.implementation,
            self.identity.proxy,
            self.reputation.implementation,
            self.reputation.proxy,
            self.validation.implementation,
            self.validation.proxy,
        ]
    }

    /// Both dependent wrappers point back at the identity wrapper.
    pub fn is_wired(&self) -> bool {
        let identity = self.identity.proxy;
        [Component::Reputation, Component::Validation]
            .iter()
            .all(|c| self.identity_registry_of(*c) == Some(identity))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        let deployment: Self = serde_json::from_str(&body)?;
        Ok(deployment)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        write_atomic(path, body.as_bytes())?;
        info!("Wrote deployment to {}", path.display());
        Ok(())
    }
}

/// Encoding of the six published addresses in a factory's storage.
pub fn encode_published(addresses: &[Address; 6]) -> Vec<u8> {
    addresses.iter().flat_map(encode_address).collect()
}

/// The six addresses a factory published, if it published any.
pub fn read_published(backend: &dyn CreationBackend, factory: &Address) -> Option<[Address; 6]> {
    let data = backend.storage_of(factory)?;
    if data.len() != WORD * 6 {
        return None;
    }
    let mut out = [Address::ZERO; 6];
    for (slot, word) in out.iter_mut().zip(data.chunks(WORD)) {
        *slot = Address::from_slice(&word[12..])?;
    }
    Some(out)
}
