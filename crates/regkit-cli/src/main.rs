//! regkit - registry deployment and source verification
//!
//! ## Commands
//!
//! - `deploy`: create the six registry contracts as one atomic unit
//! - `bundle`: write self-contained metadata manifests for manual upload
//! - `verify`: submit every deployed address to a source verifier
//! - `resolve`: show where a logical source path lands on disk

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use regkit_core::bundle::{PROXY_LABEL, SUMMARY_FILE};
use regkit_core::deploy::{DEFAULT_WRAPPER, DEPLOYMENT_FILE};
use regkit_core::{
    render_verification_summary, targets_for, write_verification_report_json, Address,
    ArtifactSpec, BatchCreation, BundleBuilder, BundlePlan, MemoryChain, PathResolver,
    ProjectConfig, RegistryDeployment, RemappingTable, Strategy, SubmitConfig,
    VerificationSubmitter, METRICS,
};
use verifier_client::{VerifierClient, VerifierConfig, VerifierMode};

#[derive(Parser)]
#[command(name = "regkit")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Registry deployment and source verification toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Project root (directory holding foundry.toml)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create implementations and proxies for all three registries, or nothing
    Deploy {
        /// Deployer account that owns the factory
        #[arg(long, env = "DEPLOYER")]
        deployer: String,

        /// Deployer nonce at factory creation
        #[arg(long, default_value = "0")]
        nonce: u64,

        /// Make creation step N (1-6) revert, to rehearse a rollback
        #[arg(long)]
        fail_at_step: Option<usize>,

        /// Chain id recorded in the deployment file
        #[arg(long, env = "CHAIN_ID")]
        chain_id: Option<u64>,

        /// Artifact the three proxies are created from
        #[arg(long, default_value = DEFAULT_WRAPPER)]
        proxy_artifact: String,

        /// Where to write the deployed addresses
        #[arg(short, long, default_value = DEPLOYMENT_FILE)]
        output: PathBuf,
    },

    /// Build upload-ready metadata bundles from compiled artifacts
    Bundle {
        /// Output directory
        #[arg(short, long, default_value = "verification-bundle")]
        out: PathBuf,

        #[command(flatten)]
        addresses: AddressArgs,

        #[command(flatten)]
        artifacts: ArtifactArgs,
    },

    /// Submit all six addresses to a source verifier
    Verify {
        #[command(flatten)]
        addresses: AddressArgs,

        #[command(flatten)]
        artifacts: ArtifactArgs,

        /// Verifier server URL
        #[arg(long, env = "VERIFIER_URL")]
        verifier_url: Option<String>,

        /// Chain the contracts live on (defaults to the deployment file's)
        #[arg(long, env = "CHAIN_ID")]
        chain_id: Option<u64>,

        /// Verifier API key
        #[arg(long, env = "VERIFIER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Transport: cli or http
        #[arg(long, default_value = "cli")]
        mode: String,

        /// Concurrent submissions (1-6)
        #[arg(long, default_value = "4")]
        pool: usize,

        /// Per-target timeout in seconds
        #[arg(long, default_value = "180")]
        timeout: u64,

        /// Write the outcome list as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Resolve one logical source path against the project
    Resolve {
        /// Path as written in compiler metadata
        logical: String,
    },
}

/// Where the six deployed addresses come from.
#[derive(Args, Debug, Default)]
struct AddressArgs {
    /// Deployment file written by `regkit deploy`
    #[arg(long)]
    deployment: Option<PathBuf>,

    #[arg(long, env = "IDENTITY_IMPL")]
    identity_impl: Option<String>,

    #[arg(long, env = "IDENTITY_PROXY")]
    identity_proxy: Option<String>,

    #[arg(long, env = "REPUTATION_IMPL")]
    reputation_impl: Option<String>,

    #[arg(long, env = "REPUTATION_PROXY")]
    reputation_proxy: Option<String>,

    #[arg(long, env = "VALIDATION_IMPL")]
    validation_impl: Option<String>,

    #[arg(long, env = "VALIDATION_PROXY")]
    validation_proxy: Option<String>,
}

impl AddressArgs {
    /// `None` when no address source was given at all.
    fn load(&self) -> Result<Option<RegistryDeployment>> {
        if let Some(path) = &self.deployment {
            let deployment = RegistryDeployment::load(path)
                .with_context(|| format!("Failed to load deployment {:?}", path))?;
            return Ok(Some(deployment));
        }

        let flags = [
            ("identity-impl", &self.identity_impl),
            ("identity-proxy", &self.identity_proxy),
            ("reputation-impl", &self.reputation_impl),
            ("reputation-proxy", &self.reputation_proxy),
            ("validation-impl", &self.validation_impl),
            ("validation-proxy", &self.validation_proxy),
        ];
        let missing: Vec<&str> = flags
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if missing.len() == flags.len() {
            return Ok(None);
        }
        if !missing.is_empty() {
            anyhow::bail!("Missing addresses: --{}", missing.join(", --"));
        }

        let mut addresses = [Address::ZERO; 6];
        for (slot, (name, value)) in addresses.iter_mut().zip(flags.iter()) {
            let raw = value.as_deref().unwrap_or_default();
            *slot = raw
                .parse()
                .with_context(|| format!("Invalid --{} {}", name, raw))?;
        }
        Ok(Some(RegistryDeployment::from_addresses(addresses)))
    }
}

/// Overrides for the contracts bundled and verified.
#[derive(Args, Debug, Default)]
struct ArtifactArgs {
    /// Identity registry as `path/File.sol:Name`
    #[arg(long)]
    identity_fqn: Option<String>,

    /// Reputation registry as `path/File.sol:Name`
    #[arg(long)]
    reputation_fqn: Option<String>,

    /// Validation registry as `path/File.sol:Name`
    #[arg(long)]
    validation_fqn: Option<String>,

    /// Proxy wrapper as `path/File.sol:Name`
    #[arg(long)]
    proxy_fqn: Option<String>,
}

impl ArtifactArgs {
    fn plan(&self) -> Result<BundlePlan> {
        let overrides = [
            ("identity", &self.identity_fqn),
            ("reputation", &self.reputation_fqn),
            ("validation", &self.validation_fqn),
            (PROXY_LABEL, &self.proxy_fqn),
        ];
        let mut plan = BundlePlan::default();
        for (label, fqn) in overrides {
            if let Some(fqn) = fqn {
                let spec = ArtifactSpec::from_fqn(label, fqn)
                    .with_context(|| format!("Expected path/File.sol:Name, got {}", fqn))?;
                plan = plan.with_artifact(spec);
            }
        }
        Ok(plan)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    regkit_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Deploy {
            deployer,
            nonce,
            fail_at_step,
            chain_id,
            proxy_artifact,
            output,
        } => {
            let options = DeployOptions {
                deployer,
                nonce,
                fail_at_step,
                chain_id,
                proxy_artifact,
            };
            cmd_deploy(&options, &output, cli.json)
        }
        Commands::Bundle {
            out,
            addresses,
            artifacts,
        } => cmd_bundle(&cli.root, &out, &addresses, &artifacts),
        Commands::Verify {
            addresses,
            artifacts,
            verifier_url,
            chain_id,
            api_key,
            mode,
            pool,
            timeout,
            report,
        } => {
            let options = VerifyOptions {
                verifier_url,
                chain_id,
                api_key,
                mode,
                pool,
                timeout_secs: timeout,
                report,
                verbose: cli.verbose,
            };
            cmd_verify(&cli.root, &addresses, &artifacts, options).await
        }
        Commands::Resolve { logical } => cmd_resolve(&cli.root, &logical, cli.json),
    };

    METRICS.flush();
    result
}

struct DeployOptions {
    deployer: String,
    nonce: u64,
    fail_at_step: Option<usize>,
    chain_id: Option<u64>,
    proxy_artifact: String,
}

/// Install the factory and run the batch creation on a fresh chain.
fn create_registry(options: &DeployOptions) -> Result<(MemoryChain, RegistryDeployment)> {
    let deployer: Address = options.deployer.parse().context("Invalid --deployer")?;

    let mut chain = match options.fail_at_step {
        Some(step) => MemoryChain::new().with_failure_at(step),
        None => MemoryChain::new(),
    };
    let factory = chain.install_factory(&deployer, options.nonce);
    info!("Factory {} (deployer {}, nonce {})", factory, deployer, options.nonce);

    let mut deployment = BatchCreation::new(factory)
        .with_wrapper_artifact(options.proxy_artifact.as_str())
        .execute(&mut chain)
        .context("Registry creation rolled back, no contracts were kept")?;
    deployment.chain_id = options.chain_id;
    Ok((chain, deployment))
}

fn cmd_deploy(options: &DeployOptions, output: &Path, json: bool) -> Result<()> {
    let (_, deployment) = create_registry(options)?;
    deployment.save(output)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&deployment)?);
        return Ok(());
    }

    println!(
        "Registry set v{} created by factory {}",
        deployment.version(),
        deployment.factory.unwrap_or_default().to_checksum()
    );
    for (component, parts) in deployment.components() {
        println!(
            "  {:<11} implementation {}  proxy {}",
            component.name(),
            parts.implementation.to_checksum(),
            parts.proxy.to_checksum()
        );
    }
    println!("Wrote {}", output.display());
    Ok(())
}

fn cmd_bundle(
    root: &Path,
    out: &Path,
    addresses: &AddressArgs,
    artifacts: &ArtifactArgs,
) -> Result<()> {
    let config = ProjectConfig::load(root).context("Failed to load project configuration")?;
    let builder = BundleBuilder::for_project(&config)?;

    let mut plan = artifacts.plan()?;
    if let Some(deployment) = addresses.load()? {
        plan = plan.with_deployment(deployment);
    }

    let report = builder.build(&plan, out)?;
    for artifact in &report.artifacts {
        println!(
            "{:<11} {:<8} {}  sha256 {}",
            artifact.label,
            artifact.status(),
            out.join(&artifact.manifest).display(),
            artifact.sha256
        );
    }
    println!("Summary: {}", out.join(SUMMARY_FILE).display());

    if !report.is_clean() {
        anyhow::bail!(
            "Bundle has {} source fault(s); see {}",
            report.fault_count(),
            out.join(SUMMARY_FILE).display()
        );
    }
    Ok(())
}

struct VerifyOptions {
    verifier_url: Option<String>,
    chain_id: Option<u64>,
    api_key: Option<String>,
    mode: String,
    pool: usize,
    timeout_secs: u64,
    report: Option<PathBuf>,
    verbose: bool,
}

async fn cmd_verify(
    root: &Path,
    addresses: &AddressArgs,
    artifacts: &ArtifactArgs,
    options: VerifyOptions,
) -> Result<()> {
    let deployment = addresses
        .load()?
        .context("No addresses: pass --deployment or all six address flags")?;
    let plan = artifacts.plan()?;
    let targets = targets_for(&deployment, &plan)?;

    let mode: VerifierMode = options.mode.parse()?;
    let mut config = VerifierConfig::from_env().with_mode(mode);
    config.project_root = root.to_path_buf();
    config.timeout_secs = options.timeout_secs;
    if let Some(url) = options.verifier_url {
        config.verifier_url = url;
    }
    if let Some(chain_id) = options.chain_id.or(deployment.chain_id) {
        config.chain_id = chain_id;
    }
    if let Some(key) = options.api_key.as_deref() {
        config = config.with_api_key(key);
    }
    let chain_id = config.chain_id;
    info!(
        "Submitting {} targets to {} (chain {})",
        targets.len(),
        config.verifier_url,
        chain_id
    );

    let client = VerifierClient::new(config).context("Failed to build verifier client")?;
    let submitter = VerificationSubmitter::new(Arc::new(client), chain_id).with_config(
        SubmitConfig::default()
            .with_pool(options.pool)
            .with_timeout(Duration::from_secs(options.timeout_secs)),
    );
    let report = submitter.submit_all(&targets).await;

    print!("{}", render_verification_summary(&report));
    if options.verbose {
        for outcome in report.outcomes.iter().filter(|o| o.status.is_success()) {
            if !outcome.raw_detail.is_empty() {
                println!("--- {} ---\n{}", outcome.label, outcome.raw_detail);
            }
        }
    }
    if let Some(path) = &options.report {
        write_verification_report_json(path, &report)?;
        println!("Report: {}", path.display());
    }

    if !report.is_success() {
        let failed: Vec<&str> = report.failed().iter().map(|o| o.label.as_str()).collect();
        anyhow::bail!("Verification failed for: {}", failed.join(", "));
    }
    Ok(())
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    logical: &'a str,
    path: &'a Path,
    strategy: Strategy,
}

fn cmd_resolve(root: &Path, logical: &str, json: bool) -> Result<()> {
    let config = ProjectConfig::load(root).context("Failed to load project configuration")?;
    let table = RemappingTable::load(&config)?;
    let resolver = PathResolver::for_project(&config, table);

    let Some(resolution) = resolver.resolve_traced(logical) else {
        anyhow::bail!("{} could not be resolved under {:?}", logical, config.root);
    };

    if json {
        let output = ResolveOutput {
            logical,
            path: &resolution.path,
            strategy: resolution.strategy,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "{} -> {} ({})",
            logical,
            resolution.path.display(),
            resolution.strategy
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regkit_core::CreationBackend;

    fn hex(byte: u8) -> Option<String> {
        Some(Address::new([byte; 20]).to_string())
    }

    #[test]
    fn parses_verify_flags() {
        let cli = Cli::try_parse_from([
            "regkit",
            "--root",
            "contracts",
            "verify",
            "--deployment",
            "deployment.json",
            "--mode",
            "http",
            "--pool",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("contracts"));
        match cli.command {
            Commands::Verify {
                addresses,
                mode,
                pool,
                timeout,
                ..
            } => {
                assert_eq!(addresses.deployment, Some(PathBuf::from("deployment.json")));
                assert_eq!(mode, "http");
                assert_eq!(pool, 2);
                assert_eq!(timeout, 180);
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn no_addresses_is_none() {
        assert!(AddressArgs::default().load().unwrap().is_none());
    }

    #[test]
    fn partial_address_set_is_rejected() {
        let args = AddressArgs {
            identity_impl: hex(1),
            identity_proxy: hex(2),
            ..Default::default()
        };
        let err = args.load().unwrap_err().to_string();
        assert!(err.contains("--reputation-impl"), "{err}");
        assert!(!err.contains("--identity-impl"), "{err}");
    }

    #[test]
    fn six_flags_build_a_wired_deployment() {
        let args = AddressArgs {
            identity_impl: hex(1),
            identity_proxy: hex(2),
            reputation_impl: hex(3),
            reputation_proxy: hex(4),
            validation_impl: hex(5),
            validation_proxy: hex(6),
            ..Default::default()
        };
        let deployment = args.load().unwrap().unwrap();
        assert!(deployment.is_wired());
        assert_eq!(deployment.addresses()[5], Address::new([6; 20]));
    }

    #[test]
    fn deployment_file_wins_over_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEPLOYMENT_FILE);
        let saved = RegistryDeployment::from_addresses([7u8, 8, 9, 10, 11, 12].map(|b| Address::new([b; 20])));
        saved.save(&path).unwrap();

        let args = AddressArgs {
            deployment: Some(path),
            identity_impl: hex(1),
            ..Default::default()
        };
        assert_eq!(args.load().unwrap(), Some(saved));
    }

    #[test]
    fn fqn_overrides_replace_plan_entries() {
        let args = ArtifactArgs {
            identity_fqn: Some("src/v2/IdentityRegistryV2.sol:IdentityRegistryV2".to_string()),
            proxy_fqn: Some("src/proxy/Wrapper.sol:Wrapper".to_string()),
            ..Default::default()
        };
        let plan = args.plan().unwrap();
        let identity = plan
            .implementations
            .iter()
            .find(|s| s.label == "identity")
            .unwrap();
        assert_eq!(identity.name, "IdentityRegistryV2");
        assert_eq!(plan.wrapper.fqn(), "src/proxy/Wrapper.sol:Wrapper");
    }

    #[test]
    fn malformed_fqn_is_an_error() {
        let args = ArtifactArgs {
            validation_fqn: Some("ValidationRegistry".to_string()),
            ..Default::default()
        };
        assert!(args.plan().is_err());
    }

    fn deploy_options(fail_at_step: Option<usize>) -> DeployOptions {
        DeployOptions {
            deployer: Address::new([0xd0; 20]).to_string(),
            nonce: 3,
            fail_at_step,
            chain_id: Some(84532),
            proxy_artifact: DEFAULT_WRAPPER.to_string(),
        }
    }

    #[test]
    fn deploy_writes_the_address_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join(DEPLOYMENT_FILE);

        cmd_deploy(&deploy_options(None), &output, true).unwrap();
        let deployment = RegistryDeployment::load(&output).unwrap();
        assert_eq!(deployment.chain_id, Some(84532));
        assert!(deployment.is_wired());
    }

    #[test]
    fn failed_deploy_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join(DEPLOYMENT_FILE);

        assert!(cmd_deploy(&deploy_options(Some(4)), &output, true).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn proxy_artifact_flag_names_the_wrappers() {
        let cli = Cli::try_parse_from([
            "regkit",
            "deploy",
            "--deployer",
            "0xd0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0",
            "--proxy-artifact",
            "TransparentUpgradeableProxy",
        ])
        .unwrap();
        let Commands::Deploy { proxy_artifact, .. } = cli.command else {
            panic!("expected deploy");
        };

        let options = DeployOptions {
            proxy_artifact,
            ..deploy_options(None)
        };
        let (chain, deployment) = create_registry(&options).unwrap();
        for (_, parts) in deployment.components() {
            let proxy = chain.code_at(&parts.proxy).unwrap();
            assert_eq!(proxy.artifact, "TransparentUpgradeableProxy");
            assert_eq!(proxy.delegate, Some(parts.implementation));
        }
    }
}
