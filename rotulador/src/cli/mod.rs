//! Command line subcommands

pub mod annotator;
pub mod ingest;
pub mod init;
pub mod migrate_legacy;
pub mod query;

use clap::Subcommand;

pub use annotator::AnnotatorArgs;
pub use ingest::IngestArgs;
pub use init::InitArgs;
pub use migrate_legacy::MigrateLegacyArgs;
pub use query::QueryArgs;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the annotation web interface
    Annotator(AnnotatorArgs),
    /// Create a sample project file and an empty database
    Init(InitArgs),
    /// Copy images from input folders into a flat folder named by hash
    Ingest(IngestArgs),
    /// Query recorded annotations
    Query(QueryArgs),
    /// Convert a database with per-task tables to the current schema
    #[command(name = "migrate-legacy-db")]
    MigrateLegacyDb(MigrateLegacyArgs),
}

impl Command {
    pub async fn run(self) -> anyhow::Result<()> {
        match self {
            Command::Annotator(args) => annotator::run(args).await,
            Command::Init(args) => init::run(args).await,
            Command::Ingest(args) => ingest::run(args).await,
            Command::Query(args) => query::run(args).await,
            Command::MigrateLegacyDb(args) => migrate_legacy::run(args).await,
        }
    }
}
