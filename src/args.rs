use clap::Parser;
use std::path::PathBuf;

/// CLI tool for scraping Kubernetes YAML manifests from public GitHub
/// repositories via the code search API, with rate-limit handling and
/// progress visualization.
#[derive(Parser)]
#[clap(
    author,
    version,
    about,
    long_about = "Searches GitHub code for Kubernetes YAML manifests and downloads every match to local storage, pacing requests against the API's search and core rate limits."
)]
pub struct Args {
    /// GitHub code search query.
    #[clap(short, long, default_value = "apiVersion kind language:YAML")]
    pub query: String,

    /// Directory to save downloaded YAML files into.
    #[clap(short, long, default_value = "./kubernetes_yaml_files")]
    pub output_dir: PathBuf,

    /// Maximum number of files to download.
    /// The code search API caps result iteration at roughly 1000 items.
    #[clap(short, long, value_name = "NUM", default_value = "1000")]
    pub max_files: usize,

    /// Save all files directly into the output directory under composite
    /// unique names instead of mirroring the repository/path hierarchy.
    #[clap(long)]
    pub flat: bool,

    /// Enable debug logging.
    #[clap(long)]
    pub debug: bool,

    /// GitHub API token for authentication.
    /// Falls back to the GITHUB_TOKEN environment variable.
    #[clap(short, long)]
    pub token: Option<String>,
}
