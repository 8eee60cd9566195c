//! helmgate CLI - chart and release administration over the helm CLI

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;

use commands::Context;
use error::Result;

#[derive(Parser)]
#[command(name = "helmgate")]
#[command(version)]
#[command(about = "Chart and release administration over the helm CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: <config dir>/helmgate/config.yaml)
    #[arg(long, global = true, env = "HELMGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the working directory root
    #[arg(long, global = true, env = "HELMGATE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a chart into the local cache
    Pull {
        /// Chart reference (repo/name or oci:// URL)
        reference: String,

        /// Chart version
        #[arg(long)]
        version: String,

        /// Also extract the chart
        #[arg(long)]
        untar: bool,

        /// Update the repository index before downloading
        #[arg(long)]
        refresh: bool,
    },

    /// Manage chart repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Search configured repositories
    Search {
        /// Keyword to search for
        keyword: String,

        /// Show every version, not only the latest
        #[arg(long)]
        versions: bool,
    },

    /// Inspect and manage releases
    Release {
        #[command(subcommand)]
        command: ReleaseCommands,
    },

    /// Cluster schema versions
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// Delete stale transient files
    Cleanup,

    /// Print the working directory layout
    Layout,
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a chart repository
    Add { name: String, url: String },

    /// Remove a chart repository
    Remove { name: String },

    /// List chart repositories
    List,

    /// Refresh repository indexes
    Update,
}

#[derive(Subcommand)]
enum ReleaseCommands {
    /// List releases
    List {
        /// Namespace to list
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// List releases in every namespace
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },

    /// Show release status
    Status {
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },

    /// Show release history
    History {
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },

    /// Uninstall a release
    Uninstall {
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },

    /// Roll a release back
    Rollback {
        name: String,

        /// Target revision (default: previous)
        revision: Option<u32>,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Find the first version of a resource kind the cluster serves
    Resolve {
        /// API group (empty for the core group)
        #[arg(long, default_value = "")]
        group: String,

        #[arg(long)]
        kind: String,

        /// Plural resource name
        #[arg(long)]
        plural: String,

        /// Probe within this namespace
        #[arg(long)]
        namespace: Option<String>,

        /// Candidate versions, most preferred first (default: from settings)
        #[arg(long, value_delimiter = ',')]
        versions: Vec<String>,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("HELMGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config.as_deref(), cli.work_dir, cli.json)?;

    match cli.command {
        Commands::Pull {
            reference,
            version,
            untar,
            refresh,
        } => commands::pull::run(&ctx, &reference, &version, untar, refresh).await,

        Commands::Repo { command } => match command {
            RepoCommands::Add { name, url } => commands::repo::add(&ctx, &name, &url).await,
            RepoCommands::Remove { name } => commands::repo::remove(&ctx, &name).await,
            RepoCommands::List => commands::repo::list(&ctx).await,
            RepoCommands::Update => commands::repo::update(&ctx).await,
        },

        Commands::Search { keyword, versions } => {
            commands::search::run(&ctx, &keyword, versions).await
        }

        Commands::Release { command } => match command {
            ReleaseCommands::List {
                namespace,
                all_namespaces,
            } => commands::release::list(&ctx, &namespace, all_namespaces).await,
            ReleaseCommands::Status { name, namespace } => {
                commands::release::status(&ctx, &name, &namespace).await
            }
            ReleaseCommands::History { name, namespace } => {
                commands::release::history(&ctx, &name, &namespace).await
            }
            ReleaseCommands::Uninstall { name, namespace } => {
                commands::release::uninstall(&ctx, &name, &namespace).await
            }
            ReleaseCommands::Rollback {
                name,
                revision,
                namespace,
            } => commands::release::rollback(&ctx, &name, &namespace, revision).await,
        },

        Commands::Schema { command } => match command {
            SchemaCommands::Resolve {
                group,
                kind,
                plural,
                namespace,
                versions,
            } => {
                let mut kind = helmgate_kube::ResourceKind::new(group, kind, plural);
                if let Some(ns) = namespace {
                    kind = kind.in_namespace(ns);
                }
                commands::schema::resolve(&ctx, &kind, &versions).await
            }
        },

        Commands::Cleanup => commands::cleanup::run(&ctx),

        Commands::Layout => commands::layout::run(&ctx),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let exit_code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(exit_code)
        }
    }
}
