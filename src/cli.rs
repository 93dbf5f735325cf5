use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "raterank",
    version,
    about = "Collect, export and correlate human quality ratings of image/text pairs"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Optional TOML configuration file.
    #[arg(long, global = true, env = "RATERANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory that relative configured paths resolve against.
    #[arg(long, global = true)]
    pub data_root: Option<PathBuf>,

    #[arg(long, global = true, env = "RATERANK_DB")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the sample catalog and report its source.
    Catalog(CatalogArgs),
    /// Store one rating submission.
    Submit(SubmitArgs),
    /// Repair a rater's legacy out-of-range scores.
    Normalize(NormalizeArgs),
    /// Write the ranked export artifact for one or more raters.
    Export(ExportArgs),
    /// Correlate rater exports with the reference ranking.
    Analyze(AnalyzeArgs),
    Status(StatusArgs),
    /// Copy ratings from a database written by the earlier service.
    ImportLegacy(ImportLegacyArgs),
    /// Drop every stored rating.
    Reset(ResetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// JSON request body; `-` reads stdin.
    #[arg(long, conflicts_with_all = ["image_id", "rater_id", "image_quality", "text_quality", "consistency"])]
    pub request: Option<PathBuf>,

    #[arg(long, required_unless_present = "request")]
    pub image_id: Option<String>,

    #[arg(long, required_unless_present = "request")]
    pub rater_id: Option<String>,

    #[arg(long, required_unless_present = "request", allow_negative_numbers = true)]
    pub image_quality: Option<i64>,

    #[arg(long, required_unless_present = "request", allow_negative_numbers = true)]
    pub text_quality: Option<i64>,

    #[arg(long, required_unless_present = "request", allow_negative_numbers = true)]
    pub consistency: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct NormalizeArgs {
    #[arg(long)]
    pub rater_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long = "rater-id", required_unless_present = "all_raters")]
    pub rater_ids: Vec<String>,

    /// Export every rater that has stored ratings.
    #[arg(long, default_value_t = false)]
    pub all_raters: bool,

    /// Also keep a timestamped snapshot next to the latest artifact.
    #[arg(long, default_value_t = false)]
    pub snapshot: bool,

    #[arg(long)]
    pub export_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Raters to analyze; defaults to every latest export found.
    #[arg(long = "rater-id")]
    pub rater_ids: Vec<String>,

    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Manifest carrying the reference `stratified_rank` values.
    #[arg(long)]
    pub reference_path: Option<PathBuf>,

    #[arg(long)]
    pub top_n: Option<usize>,

    #[arg(long)]
    pub significance_level: Option<f64>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImportLegacyArgs {
    #[arg(long)]
    pub legacy_db_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Required confirmation; reset is irreversible.
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}
