use clap::Parser;
use dotenv::dotenv;
use k8s_yaml_scraper::{init_logging, Args, YamlScraper};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args = Args::parse();

    // An unwritable output root is a startup failure, same as a missing
    // credential.
    let _guard = match init_logging(args.debug, &args.output_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Missing/invalid credentials are the only other fatal startup path;
    // per-file failures during the run never change the exit code.
    let scraper = match YamlScraper::new(&args) {
        Ok(scraper) => scraper,
        Err(e) => {
            error!("Setup error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match scraper.run().await {
        Ok(summary) => {
            info!(
                "Pipeline finished. {} of {} files downloaded.",
                summary.succeeded, summary.attempted
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Unrecoverable error: {}", e);
            ExitCode::FAILURE
        }
    }
}
