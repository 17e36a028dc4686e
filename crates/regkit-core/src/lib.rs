//! regkit Core Library
//!
//! Atomic creation of the identity / reputation / validation registry set,
//! reconstruction of self-contained compiler manifests from build output,
//! and submission of the deployed addresses to a source verifier.

pub mod bundle;
pub mod config;
pub mod deploy;
pub mod domain;
pub mod fs;
pub mod hash;
pub mod inline;
pub mod locator;
pub mod metrics;
pub mod obs;
pub mod remap;
pub mod reporting;
pub mod resolver;
pub mod telemetry;
pub mod verify;

pub use domain::{Address, Artifact, Manifest, RegkitError, Result, SourceEntry};

pub use bundle::{ArtifactReport, ArtifactSpec, BundleBuilder, BundlePlan, BundleReport};
pub use config::ProjectConfig;
pub use deploy::{
    BatchCreation, Component, ComponentDeployment, CreationBackend, MemoryChain,
    RegistryDeployment,
};
pub use hash::{keccak256, Keccak};
pub use inline::{InlineReport, MetadataInliner, SourceOutcome, SourceStatus};
pub use locator::{ArtifactLocator, LocateMode};
pub use remap::{RemappingRule, RemappingTable};
pub use resolver::{PathResolver, Resolution, Strategy};
pub use verify::{
    classify, targets_for, SubmitConfig, VerificationOutcome, VerificationReport,
    VerificationStatus, VerificationSubmitter, VerificationTarget,
};

pub use reporting::{render_bundle_summary, render_verification_summary, write_verification_report_json};

pub use metrics::METRICS;
pub use obs::{
    emit_artifact_written, emit_bundle_started, emit_creation_reverted, emit_creation_step,
    emit_source_fault, emit_submission_finished, PassSpan,
};
pub use telemetry::init_tracing;

/// regkit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
