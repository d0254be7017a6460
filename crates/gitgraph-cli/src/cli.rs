use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gitgraph",
    about = "Git object graph index: lookups, crawl queue and edge inspection",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot file holding the index; overrides the configured path
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Find objects by full or abbreviated SHA1
    Lookup(LookupArgs),
    /// Register a repository by URL
    Register(RegisterArgs),
    /// Approve a repository for crawling
    Approve(RepoArgs),
    /// List repositories due for indexing
    Queue(QueueArgs),
    /// Rank repositories by object count
    Top(TopArgs),
    /// Recompute a repository's object count
    Recount(RepoArgs),
    /// Atomically claim a repository for indexing
    Claim(RepoArgs),
    /// Release a claimed repository as freshly indexed
    Finish(RepoArgs),
    /// Record an edge between two objects
    Link(LinkArgs),
    /// List edges leaving (or, with --reverse, arriving at) an object
    Edges(EdgesArgs),
    /// Drop every collection in the index
    Reset,
}

#[derive(Args)]
pub struct LookupArgs {
    pub sha: String,
    #[arg(long)]
    pub partial: bool,
    #[arg(long, default_value = "0")]
    pub offset: usize,
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct RegisterArgs {
    pub url: String,
    #[arg(long)]
    pub approve: bool,
}

#[derive(Args)]
pub struct RepoArgs {
    pub repo: String,
}

#[derive(Args)]
pub struct QueueArgs {
    /// Only repositories last indexed before this RFC 3339 time
    #[arg(long)]
    pub before: Option<String>,
}

#[derive(Args)]
pub struct TopArgs {
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub ascending: bool,
}

#[derive(Args)]
pub struct LinkArgs {
    pub relation: String,
    pub key1: String,
    pub key2: String,
    #[arg(long)]
    pub label: Option<String>,
}

#[derive(Args)]
pub struct EdgesArgs {
    pub relation: String,
    pub id: String,
    #[arg(long)]
    pub reverse: bool,
}
