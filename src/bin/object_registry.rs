//! Object Registry CLI
//!
//! Inspects the registered object schemas: versions, fields, negotiation
//! results, fingerprints and minor-version compatibility.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use versioned_objects::config::LogFormat;
use versioned_objects::{objects, Fingerprint, ObjectRegistry, ObjectVersion, ObjectsConfig};

#[derive(Parser)]
#[command(name = "object-registry")]
#[command(about = "Inspect versioned object schemas")]
struct Cli {
    /// Config file (defaults to objects.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered object types and their versions
    List,

    /// Show the fields of an object schema
    Show {
        object: String,
        /// Version to show (defaults to latest)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Resolve a requested version to the registered one that would serve it
    Resolve { object: String, version: String },

    /// Print schema fingerprints, or verify them against a saved file
    Fingerprints {
        /// JSON file of previously recorded fingerprints
        #[arg(long)]
        verify: Option<PathBuf>,
    },

    /// Print the version manifest sent with remote calls
    Manifest,

    /// Re-check compatibility between all same-major versions
    Check,
}

fn init_logging(config: &ObjectsConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ObjectsConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_logging(&config);

    let registry = objects::default_registry()?;

    match cli.command {
        Commands::List => {
            println!("📦 Registered objects:");
            for name in registry.object_names() {
                let versions: Vec<String> =
                    registry.versions(name).iter().map(|v| v.to_string()).collect();
                println!("  {} [{}]", name, versions.join(", "));
            }
        }

        Commands::Show { object, version } => {
            let schema = match version {
                Some(v) => registry
                    .get(&object, &ObjectVersion::parse(&v)?)
                    .with_context(|| format!("{} {} is not registered", object, v))?,
                None => registry.latest(&object)?,
            };
            println!("📄 {} {}", schema.name, schema.version);
            for (name, descriptor) in schema.fields() {
                let nullable = if descriptor.nullable { " (nullable)" } else { "" };
                println!("  {:<24} {}{}", name, descriptor.field_type, nullable);
            }
            let remotable: Vec<&str> = schema.remotable_methods().collect();
            println!("  remotable: {}", remotable.join(", "));
            println!("  fingerprint: {}", schema.fingerprint());
        }

        Commands::Resolve { object, version } => {
            let requested = ObjectVersion::parse(&version)?;
            let schema = registry.resolve(&object, &requested)?;
            println!("✅ {} {} -> {}", object, requested, schema.version);
        }

        Commands::Fingerprints { verify } => {
            let current = registry.fingerprints();
            match verify {
                None => println!("{}", serde_json::to_string_pretty(&current)?),
                Some(path) => verify_fingerprints(&current, &path)?,
            }
        }

        Commands::Manifest => {
            let ctx = config.context()?;
            let manifest = ctx.version_manifest(&registry);
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }

        Commands::Check => check_all(&registry)?,
    }

    Ok(())
}

fn verify_fingerprints(
    current: &BTreeMap<String, Vec<Fingerprint>>,
    path: &Path,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let recorded: BTreeMap<String, Vec<Fingerprint>> = serde_json::from_str(&content)?;

    let mut mismatches = 0;
    for (object, fingerprints) in &recorded {
        let Some(now) = current.get(object) else {
            println!("  ❌ {} - no longer registered", object);
            mismatches += 1;
            continue;
        };
        for fingerprint in fingerprints {
            if !now.contains(fingerprint) {
                println!("  ❌ {} {} - changed without a version bump", object, fingerprint);
                mismatches += 1;
            }
        }
    }

    if mismatches > 0 {
        bail!("{} fingerprint mismatches", mismatches);
    }
    println!("✅ All recorded fingerprints match");
    Ok(())
}

fn check_all(registry: &ObjectRegistry) -> anyhow::Result<()> {
    let mut breaking = 0;
    for name in registry.object_names() {
        let versions = registry.versions(name);
        for pair in versions.windows(2) {
            let (old, new) = (pair[0], pair[1]);
            if !new.is_compatible_with(old) {
                println!("  ⏭️  {} {} -> {} - major bump, skipped", name, old, new);
                continue;
            }
            let result = registry.check_compatibility(name, old, new)?;
            if result.is_compatible {
                println!("  ✅ {} {} -> {} - {}", name, old, new, result.summary);
            } else {
                println!("  ❌ {} {} -> {} - {}", name, old, new, result.summary);
                breaking += 1;
            }
        }
    }

    if breaking > 0 {
        bail!("{} incompatible minor versions", breaking);
    }
    Ok(())
}
