use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlgauge",
    version,
    about = "Quality metrics for machine-generated SQL"
)]
pub struct Cli {
    /// emit logs as JSON lines (stderr)
    #[arg(long, global = true, env = "SQLGAUGE_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate a batch of queries and write the report
    Run(RunArgs),
    /// Check credentials and the evaluation database
    Doctor(DoctorArgs),
    /// Write a sample sqlgauge.yaml
    Init(InitArgs),
    Version,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    /// config file; sqlgauge.yaml is used when present
    #[arg(long, env = "SQLGAUGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// batch file: JSON array or JSONL of objects with a generated_sql field
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "sqlgauge-report.json")]
    pub out: PathBuf,

    /// evaluation database (overrides the config file)
    #[arg(long, env = "SQLGAUGE_DATABASE")]
    pub database: Option<PathBuf>,

    /// oracle provider: watsonx|openai|fake
    #[arg(long, env = "SQLGAUGE_PROVIDER")]
    pub provider: Option<String>,

    /// oracle model name
    #[arg(long)]
    pub model: Option<String>,

    /// upper bound on concurrent result comparisons
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// reject unknown config keys instead of warning
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct DoctorArgs {
    #[arg(long, env = "SQLGAUGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "SQLGAUGE_DATABASE")]
    pub database: Option<PathBuf>,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}

#[derive(Parser, Clone, Debug)]
pub struct InitArgs {
    #[arg(long, default_value = "sqlgauge.yaml")]
    pub config: PathBuf,
}
