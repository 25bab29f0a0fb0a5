//! trailmirror CLI
//!
//! Mirrors CloudTrail log archives from S3 into locally partitioned JSONL
//! files with checkpointed resumption and cross-run deduplication.

use clap::Parser;

mod args;
mod generate;
mod run;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    run::init_logging(cli.log_level)?;

    match cli.command {
        Command::GenerateConfig { output } => {
            generate::execute(&output).await?;
        }
        Command::Run { config } => {
            let stats = run::execute(&config).await?;
            let mb_downloaded = stats.bytes_downloaded as f64 / 1_048_576.0;

            eprintln!();
            eprintln!("Run completed:");
            eprintln!("  Files listed:       {}", stats.files_listed);
            eprintln!("  Files downloaded:   {}", stats.files_downloaded);
            eprintln!("  Files processed:    {}", stats.files_processed);
            eprintln!("  Events processed:   {}", stats.events_processed);
            eprintln!("  Events written:     {}", stats.events_written);
            eprintln!("  Events duplicate:   {}", stats.events_duplicate);
            eprintln!("  Downloaded:         {:.1} MB", mb_downloaded);
            eprintln!("  JSONL files:        {}", stats.jsonl_files);

            if stats.elapsed_secs > 0.0 {
                eprintln!("  Duration:           {:.2}s", stats.elapsed_secs);
                if stats.files_downloaded > 0 {
                    eprintln!(
                        "  Throughput:         {:.1} files/sec, {:.1} MB/s",
                        stats.files_downloaded as f64 / stats.elapsed_secs,
                        mb_downloaded / stats.elapsed_secs
                    );
                }
            }

            if stats.errors > 0 {
                eprintln!("  Errors:             {}", stats.errors);
            }
        }
    }

    Ok(())
}
