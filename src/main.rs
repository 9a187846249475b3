use anyhow::{bail, Context, Result};
use clap::Parser;

use cardcrop::{CardError, CardPipeline, Cli, DirectoryWriter, ImageReport};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.to_config().context("Invalid configuration")?;
    let output_root = cli.output_root(&config);

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("Failed to configure worker pool")?;
    }

    tracing::info!(
        inputs = cli.inputs.len(),
        output = %output_root.display(),
        "Starting"
    );

    let pipeline = CardPipeline::new(config).context("Failed to build pipeline")?;
    let writer = DirectoryWriter::new(&output_root);
    let outcomes = if cli.trim_only {
        pipeline.trim_batch(&cli.inputs, &writer)
    } else {
        pipeline.run_batch(&cli.inputs, &writer)
    };

    let mut reports: Vec<&ImageReport> = Vec::new();
    let mut failed = 0;
    for (path, outcome) in &outcomes {
        match outcome {
            Ok(report) => {
                if cli.trim_only {
                    for written in &report.written {
                        eprintln!(
                            "{}: trimmed image saved to {}",
                            path.display(),
                            written.display()
                        );
                    }
                } else {
                    eprintln!(
                        "{}: {} card(s), {} rejected, {} warning(s), {} file(s) written",
                        path.display(),
                        report.accepted,
                        report.rejected.total(),
                        report.warnings.len(),
                        report.written.len()
                    );
                }
                for warning in &report.warnings {
                    eprintln!("  warning: {}", warning);
                }
                for error in &report.write_errors {
                    eprintln!("  write error: {}", error);
                }
                if !report.write_errors.is_empty() {
                    failed += 1;
                }
                reports.push(report);
            }
            Err(CardError::NotAFile(_)) if cli.trim_only => {
                eprintln!("warning: {} is not a regular file, skipping", path.display());
            }
            Err(e) if e.is_per_input() => {
                eprintln!("{}: failed: {}", path.display(), e);
                failed += 1;
            }
            Err(e) => bail!("{}: {}", path.display(), e),
        }
    }

    if !reports.is_empty() {
        let summary_path = output_root.join("summary.json");
        std::fs::create_dir_all(&output_root)
            .with_context(|| format!("Failed to create output directory: {:?}", output_root))?;
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialize summary")?;
        std::fs::write(&summary_path, json)
            .with_context(|| format!("Failed to write summary: {:?}", summary_path))?;
        eprintln!();
        eprintln!("Saved results under {:?}", output_root);
    }

    if failed > 0 {
        bail!("{} of {} input(s) failed", failed, outcomes.len());
    }
    Ok(())
}
