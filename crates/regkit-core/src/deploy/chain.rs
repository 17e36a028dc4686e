//! Creation backends for the atomic batch.
//!
//! [`CreationBackend`] is the seam between the orchestrator and whatever
//! executes contract creation. [`MemoryChain`] is the in-process
//! implementation: CREATE addresses, per-account nonces, stored payloads and
//! a journal that makes every change revertible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::address::Address;
use crate::hash::keccak256;

/// Backend errors. The orchestrator folds them into
/// [`RegkitError::AtomicCreationFailed`](crate::domain::error::RegkitError::AtomicCreationFailed).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("creation reverted: {0}")]
    Reverted(String),

    #[error("delegate {0} has no code")]
    DelegateWithoutCode(Address),

    #[error("address {0} already has code")]
    Collision(Address),

    #[error("unknown creator {0}")]
    UnknownCreator(Address),
}

/// One contract creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Human-readable step label, e.g. `"identity proxy"`.
    pub label: String,
    /// Artifact the code comes from.
    pub artifact: String,
    /// For wrappers: the implementation calls are forwarded to.
    pub delegate: Option<Address>,
    /// Initializer call data run in the wrapper's constructor.
    pub init_call: Vec<u8>,
}

impl CreateRequest {
    pub fn implementation(label: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            artifact: artifact.into(),
            delegate: None,
            init_call: Vec::new(),
        }
    }

    pub fn wrapper(
        label: impl Into<String>,
        artifact: impl Into<String>,
        delegate: Address,
        init_call: Vec<u8>,
    ) -> Self {
        Self {
            label: label.into(),
            artifact: artifact.into(),
            delegate: Some(delegate),
            init_call,
        }
    }
}

/// Code deployed at an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub artifact: String,
    pub creator: Address,
    pub delegate: Option<Address>,
}

/// Opaque journal position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Executes contract creation with checkpoint/revert semantics.
pub trait CreationBackend {
    /// Create a contract from `creator`, returning its address.
    fn create(&mut self, creator: &Address, request: &CreateRequest) -> Result<Address, ChainError>;

    /// Current journal position.
    fn checkpoint(&self) -> Checkpoint;

    /// Undo every change made after `checkpoint`.
    fn revert_to(&mut self, checkpoint: Checkpoint);

    /// Code at `address`, if any.
    fn code_at(&self, address: &Address) -> Option<&Contract>;

    /// Raw storage of `address`, if any was written.
    fn storage_of(&self, address: &Address) -> Option<&[u8]>;

    /// Overwrite the storage of an existing contract.
    fn set_storage(&mut self, address: &Address, data: Vec<u8>) -> Result<(), ChainError>;
}

/// `keccak256(rlp([sender, nonce]))[12..]`, the address CREATE assigns.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut content = Vec::with_capacity(30);
    content.push(0x80 + 20);
    content.extend_from_slice(sender.as_bytes());

    match nonce {
        0 => content.push(0x80),
        1..=0x7f => content.push(nonce as u8),
        _ => {
            let bytes = nonce.to_be_bytes();
            let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
            content.push(0x80 + (8 - start) as u8);
            content.extend_from_slice(&bytes[start..]);
        }
    }

    // content is at most 30 bytes, so the short list header always applies
    let mut rlp = Vec::with_capacity(content.len() + 1);
    rlp.push(0xc0 + content.len() as u8);
    rlp.extend_from_slice(&content);

    let hash = keccak256(&rlp);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.as_bytes()[12..]);
    Address::new(out)
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Created(Address),
    Nonce(Address, Option<u64>),
    Storage(Address, Option<Vec<u8>>),
}

/// In-process chain state.
#[derive(Debug, Default)]
pub struct MemoryChain {
    code: BTreeMap<Address, Contract>,
    nonces: BTreeMap<Address, u64>,
    storage: BTreeMap<Address, Vec<u8>>,
    journal: Vec<JournalEntry>,
    create_calls: usize,
    fail_on_create: Option<usize>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th `create` call (1-based, counted over the chain's
    /// lifetime) revert.
    pub fn with_failure_at(mut self, n: usize) -> Self {
        self.fail_on_create = Some(n);
        self
    }

    /// Place the factory contract the deployer creates with `deployer_nonce`.
    /// Not journaled.
    pub fn install_factory(&mut self, deployer: &Address, deployer_nonce: u64) -> Address {
        let factory = create_address(deployer, deployer_nonce);
        self.code.insert(
            factory,
            Contract {
                artifact: "RegistryFactory".to_string(),
                creator: *deployer,
                delegate: None,
            },
        );
        self.nonces.insert(factory, 1);
        self.nonces.insert(*deployer, deployer_nonce + 1);
        factory
    }

    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    /// Number of contracts with code.
    pub fn contract_count(&self) -> usize {
        self.code.len()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        let previous = self.nonces.insert(address, nonce);
        self.journal.push(JournalEntry::Nonce(address, previous));
    }

    fn write_storage(&mut self, address: Address, data: Vec<u8>) {
        let previous = self.storage.insert(address, data);
        self.journal.push(JournalEntry::Storage(address, previous));
    }
}

impl CreationBackend for MemoryChain {
    fn create(&mut self, creator: &Address, request: &CreateRequest) -> Result<Address, ChainError> {
        self.create_calls += 1;
        if self.fail_on_create == Some(self.create_calls) {
            return Err(ChainError::Reverted(format!(
                "injected failure in {}",
                request.label
            )));
        }
        if !self.code.contains_key(creator) {
            return Err(ChainError::UnknownCreator(*creator));
        }
        if let Some(delegate) = request.delegate {
            if !self.code.contains_key(&delegate) {
                return Err(ChainError::DelegateWithoutCode(delegate));
            }
        }

        let nonce = self.nonce_of(creator);
        let address = create_address(creator, nonce);
        if self.code.contains_key(&address) {
            return Err(ChainError::Collision(address));
        }

        self.set_nonce(*creator, nonce + 1);
        self.code.insert(
            address,
            Contract {
                artifact: request.artifact.clone(),
                creator: *creator,
                delegate: request.delegate,
            },
        );
        self.journal.push(JournalEntry::Created(address));
        self.set_nonce(address, 1);
        if !request.init_call.is_empty() {
            self.write_storage(address, request.init_call.clone());
        }

        trace!("created {} at {} (nonce {})", request.artifact, address, nonce);
        Ok(address)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        let undone = self.journal.len().saturating_sub(checkpoint.0);
        while self.journal.len() > checkpoint.0 {
            match self.journal.pop() {
                Some(JournalEntry::Created(address)) => {
                    self.code.remove(&address);
                }
                Some(JournalEntry::Nonce(address, previous)) => match previous {
                    Some(n) => {
                        self.nonces.insert(address, n);
                    }
                    None => {
                        self.nonces.remove(&address);
                    }
                },
                Some(JournalEntry::Storage(address, previous)) => match previous {
                    Some(data) => {
                        self.storage.insert(address, data);
                    }
                    None => {
                        self.storage.remove(&address);
                    }
                },
                None => break,
            }
        }
        debug!("Reverted {} journal entries", undone);
    }

    fn code_at(&self, address: &Address) -> Option<&Contract> {
        self.code.get(address)
    }

    fn storage_of(&self, address: &Address) -> Option<&[u8]> {
        self.storage.get(address).map(Vec::as_slice)
    }

    fn set_storage(&mut self, address: &Address, data: Vec<u8>) -> Result<(), ChainError> {
        if !self.code.contains_key(address) {
            return Err(ChainError::Reverted(format!("no contract at {}", address)));
        }
        self.write_storage(*address, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn create_address_known_vectors() {
        let sender = addr("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0");
        assert_eq!(
            create_address(&sender, 0),
            addr("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d")
        );
        assert_eq!(
            create_address(&sender, 1),
            addr("0x343c43a37d37dff08ae8c4a11544c718abb4fcf8")
        );
        assert_eq!(
            create_address(&sender, 2),
            addr("0xf778b86fa74e846c4f0a1fbd1335fe81c00a0c91")
        );
    }

    #[test]
    fn create_address_large_nonce_differs() {
        let sender = Address::new([42u8; 20]);
        assert_ne!(create_address(&sender, 127), create_address(&sender, 128));
        assert_ne!(create_address(&sender, 0x100), create_address(&sender, 0x10000));
    }

    #[test]
    fn factory_creates_at_sequential_nonces() {
        let mut chain = MemoryChain::new();
        let factory = chain.install_factory(&Address::new([1u8; 20]), 0);
        let a = chain
            .create(&factory, &CreateRequest::implementation("a", "A"))
            .unwrap();
        let b = chain
            .create(&factory, &CreateRequest::implementation("b", "B"))
            .unwrap();
        assert_eq!(a, create_address(&factory, 1));
        assert_eq!(b, create_address(&factory, 2));
        assert_eq!(chain.nonce_of(&factory), 3);
    }

    #[test]
    fn wrapper_requires_delegate_code() {
        let mut chain = MemoryChain::new();
        let factory = chain.install_factory(&Address::new([1u8; 20]), 0);
        let missing = Address::new([9u8; 20]);
        let err = chain
            .create(&factory, &CreateRequest::wrapper("p", "Proxy", missing, vec![1]))
            .unwrap_err();
        assert_eq!(err, ChainError::DelegateWithoutCode(missing));
    }

    #[test]
    fn revert_restores_everything() {
        let mut chain = MemoryChain::new();
        let factory = chain.install_factory(&Address::new([1u8; 20]), 5);
        let cp = chain.checkpoint();

        let imp = chain
            .create(&factory, &CreateRequest::implementation("i", "Impl"))
            .unwrap();
        let proxy = chain
            .create(&factory, &CreateRequest::wrapper("p", "Proxy", imp, vec![0xaa]))
            .unwrap();
        chain.set_storage(&factory, vec![1, 2, 3]).unwrap();
        assert_eq!(chain.storage_of(&proxy), Some(&[0xaa][..]));

        chain.revert_to(cp);
        assert!(chain.code_at(&imp).is_none());
        assert!(chain.code_at(&proxy).is_none());
        assert!(chain.storage_of(&proxy).is_none());
        assert!(chain.storage_of(&factory).is_none());
        assert_eq!(chain.nonce_of(&factory), 1);
        assert_eq!(chain.contract_count(), 1);
        assert_eq!(chain.journal_len(), 0);
    }

    #[test]
    fn injected_failure_hits_requested_call() {
        let mut chain = MemoryChain::new().with_failure_at(2);
        let factory = chain.install_factory(&Address::new([1u8; 20]), 0);
        assert!(chain
            .create(&factory, &CreateRequest::implementation("one", "A"))
            .is_ok());
        match chain.create(&factory, &CreateRequest::implementation("two", "B")) {
            Err(ChainError::Reverted(reason)) => assert!(reason.contains("two")),
            other => panic!("expected Reverted, got {other:?}"),
        }
    }

    #[test]
    fn unknown_creator_rejected() {
        let mut chain = MemoryChain::new();
        let stranger = Address::new([7u8; 20]);
        assert_eq!(
            chain
                .create(&stranger, &CreateRequest::implementation("x", "X"))
                .unwrap_err(),
            ChainError::UnknownCreator(stranger)
        );
    }
}
