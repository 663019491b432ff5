use clap::Parser;
use longitudinal_unifrac::io::{
    SheetColumns, read_abundance_table, read_sample_sheet, read_tree, write_distance_array,
};
use longitudinal_unifrac::{LufConfig, TimeLabels, compute};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Compute longitudinal UniFrac distances between subjects sampled at two
/// time points, and write one labeled distance matrix (TSV) per metric.
#[derive(Parser, Debug)]
#[command(name = "luf", version, about = "Longitudinal UniFrac distance matrices")]
struct Args {
    /// Path to a rooted Newick tree (optionally .gz)
    #[arg(short = 't', long = "tree")]
    tree: PathBuf,

    /// Abundance table TSV, samples as rows and taxa as columns (optionally .gz)
    #[arg(short = 'a', long = "table")]
    table: PathBuf,

    /// Sample sheet TSV mapping samples to subjects and time points
    #[arg(short = 'm', long = "metadata")]
    metadata: PathBuf,

    /// Output directory; receives one <metric>.tsv per metric
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Generalized metric exponents (repeat or comma-separate)
    #[arg(long = "alpha", value_delimiter = ',', default_values_t = [0.0, 0.5, 1.0])]
    alphas: Vec<f64>,

    /// Sample sheet column holding sample IDs (default: first column)
    #[arg(long = "sample-column")]
    sample_column: Option<String>,

    /// Sample sheet column holding subject IDs
    #[arg(long = "subject-column", default_value = "subject")]
    subject_column: String,

    /// Sample sheet column holding time labels
    #[arg(long = "time-column", default_value = "time")]
    time_column: String,

    /// Time label of the first time point
    #[arg(long = "time1", default_value = "1")]
    time1: String,

    /// Time label of the second time point
    #[arg(long = "time2", default_value = "2")]
    time2: String,

    /// The abundance table has taxa as rows and samples as columns
    #[arg(long = "taxa-as-rows", default_value_t = false)]
    taxa_as_rows: bool,

    /// Number of worker threads (default: all cores)
    #[arg(short = 'j', long = "threads")]
    threads: Option<usize>,

    /// Gzip-compress the output matrices
    #[arg(long = "gzip", default_value_t = false)]
    gzip: bool,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode: log debug details
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    let labels = TimeLabels::new(args.time1.clone(), args.time2.clone());
    let config = LufConfig::default()
        .with_alphas(args.alphas.clone())
        .with_time_labels(labels.clone())
        .with_threads(args.threads);
    let columns = SheetColumns {
        sample: args.sample_column.clone(),
        subject: args.subject_column.clone(),
        time: args.time_column.clone(),
    };

    // Read inputs
    let t0 = Instant::now();
    let inputs = read_tree(&args.tree).and_then(|tree| {
        let table = read_abundance_table(&args.table, args.taxa_as_rows)?;
        let sheet = read_sample_sheet(&args.metadata, &columns, &labels)?;
        Ok((tree, table, sheet))
    });
    let (tree, table, sheet) = match inputs {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to read inputs: {e}");
            return ExitCode::from(2);
        }
    };
    info!(
        "Read {} tips, {} samples x {} taxa in {:.3}s",
        tree.n_tips(),
        table.n_samples(),
        table.n_taxa(),
        t0.elapsed().as_secs_f64()
    );

    // Compute
    let t1 = Instant::now();
    let dists = match compute(&tree, &table, &sheet, &config) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to compute distances: {e}");
            return ExitCode::from(3);
        }
    };
    let n = dists.n_subjects();
    info!(
        "Determined {} metrics for {} subject pairs in {:.3}s",
        dists.metrics().len(),
        n * n.saturating_sub(1) / 2,
        t1.elapsed().as_secs_f64()
    );

    // Write
    let t2 = Instant::now();
    match write_distance_array(&args.output, &dists, args.gzip) {
        Ok(paths) => {
            info!(
                "Wrote {} matrices to {:?} in {:.3}s",
                paths.len(),
                args.output,
                t2.elapsed().as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write output {:?}: {e}", args.output);
            ExitCode::from(4)
        }
    }
}
