use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fipho",
    version,
    about = "Fiber-photometry preprocessing command-line tool",
    long_about = "Run the photometry conditioning pipeline (zero-phase low-pass filter,\n\
                  double-exponential detrend, isosbestic motion correction, dF/F and\n\
                  z-score normalization) on two-channel recording CSVs, and export\n\
                  event-aligned windows for downstream statistics."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process one session (one or two recording sides)
    Run(RunArgs),
    /// Process every session listed in a JSON manifest
    Batch(BatchArgs),
    /// Export event-aligned windows from a processed subject directory
    Align(AlignArgs),
    /// Validate a recording CSV
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct PipelineArgs {
    /// Low-pass cutoff frequency in Hz
    #[arg(long, default_value_t = 10.0)]
    pub cutoff: f64,

    /// Butterworth filter order
    #[arg(long, default_value_t = 2)]
    pub order: usize,

    /// Evaluation budget for each double-exponential fit
    #[arg(long, default_value_t = 1000)]
    pub max_fit_evals: usize,

    /// Baseline magnitudes at or below this yield NaN in dF/F
    #[arg(long, default_value_t = 1e-12)]
    pub baseline_epsilon: f64,
}

#[derive(Args)]
pub struct RunArgs {
    /// Recording CSV for side A (columns: signal, signal_ts, isos, isos_ts)
    #[arg(long)]
    pub recording_a: Option<String>,

    /// Events CSV for side A (columns: ts, notes, index)
    #[arg(long)]
    pub events_a: Option<String>,

    /// Subject identifier for side A (default: recording file stem)
    #[arg(long)]
    pub subject_a: Option<String>,

    /// Recording CSV for side B
    #[arg(long)]
    pub recording_b: Option<String>,

    /// Events CSV for side B
    #[arg(long)]
    pub events_b: Option<String>,

    /// Subject identifier for side B (default: recording file stem)
    #[arg(long)]
    pub subject_b: Option<String>,

    /// Treatment/group name used as the output subdirectory
    #[arg(long, default_value = "session")]
    pub treatment: String,

    /// Brain region label written to info.csv
    #[arg(long, default_value = "unknown")]
    pub region: String,

    /// Sensor label written to info.csv
    #[arg(long, default_value = "unknown")]
    pub sensor: String,

    /// Signal sampling rate in Hz (default: inferred from timestamps)
    #[arg(long)]
    pub sr_signal: Option<f64>,

    /// Isosbestic sampling rate in Hz (default: inferred from timestamps)
    #[arg(long)]
    pub sr_isos: Option<f64>,

    /// Output directory root
    #[arg(short, long)]
    pub output_dir: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// JSON session manifest
    #[arg(long)]
    pub manifest: String,

    /// Output directory root
    #[arg(short, long)]
    pub output_dir: String,

    /// Keep processing remaining sessions after a failure
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List the sessions that would run, then exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct AlignArgs {
    /// Processed subject directory (contains data/normalised_data.csv and timestamps.csv)
    #[arg(long)]
    pub subject_dir: String,

    /// Seconds of trace to keep before each event onset
    #[arg(long, default_value_t = 20.0)]
    pub pre: f64,

    /// Seconds of trace to keep after each event onset
    #[arg(long, default_value_t = 60.0)]
    pub post: f64,

    /// Block size for mean downsampling before windowing
    #[arg(long, default_value_t = 10)]
    pub downsample: usize,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Recording CSV to validate
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl PipelineArgs {
    pub fn to_config(&self) -> fipho_rs::PipelineConfig {
        fipho_rs::PipelineConfig {
            lowpass_cutoff_hz: self.cutoff,
            filter_order: self.order,
            max_fit_evaluations: self.max_fit_evals,
            baseline_epsilon: self.baseline_epsilon,
        }
    }
}
