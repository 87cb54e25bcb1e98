use super::args::*;
use sqlgauge_core::config::{load_config, GaugeConfig, OracleCredentials, OracleSettings};
use sqlgauge_core::database::SqliteDatabase;
use sqlgauge_core::engine::Runner;
use sqlgauge_core::errors::{try_map_error, ConfigError, ErrorClass};
use sqlgauge_core::oracle::{
    EntityOracle, EquivalenceOracle, LlmEntityExtractor, LlmEquivalenceJudge, TabularComparator,
};
use sqlgauge_core::providers::llm::fake::FakeClient;
use sqlgauge_core::providers::llm::openai::OpenAIClient;
use sqlgauge_core::providers::llm::watsonx::WatsonxClient;
use sqlgauge_core::providers::llm::LlmClient;
use sqlgauge_metrics::{default_analyzers, AnalyzerDeps};
use std::path::Path;
use std::sync::Arc;

pub mod doctor;

pub const DEFAULT_CONFIG: &str = "sqlgauge.yaml";

/// Canned answer of the offline `fake` provider. It parses both as an entity
/// set and as an equivalence verdict.
const FAKE_ANSWER: &str = r#"{"tables": ["NA"], "columns": ["NA"], "conditions": ["NA"], "aggregate_functions": ["NA"], "equivalence": true}"#;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const FATAL: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => cmd_run(args).await,
        Command::Doctor(args) => doctor::run(args).await,
        Command::Init(args) => cmd_init(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// Config and input problems mean nothing was processed.
pub fn exit_code_for(e: &anyhow::Error) -> i32 {
    match try_map_error(e) {
        Some(ErrorClass::Config) | Some(ErrorClass::Input) => exit_codes::CONFIG_ERROR,
        _ => exit_codes::FATAL,
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists", args.config.display());
        return Ok(exit_codes::OK);
    }
    if let Some(parent) = args.config.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    sqlgauge_core::config::write_sample_config(&args.config)?;
    eprintln!("created {}", args.config.display());
    Ok(exit_codes::OK)
}

/// Explicit `--config` must exist; otherwise `sqlgauge.yaml` is read when
/// present and defaults apply when it is not.
pub(crate) fn resolve_config(
    explicit: Option<&Path>,
    strict: bool,
) -> Result<GaugeConfig, ConfigError> {
    match explicit {
        Some(path) => load_config(path, strict),
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(Path::new(DEFAULT_CONFIG), strict),
        None => Ok(GaugeConfig::default()),
    }
}

pub(crate) fn open_database(path: &Path) -> anyhow::Result<SqliteDatabase> {
    // sqlite would silently create an empty file
    if !path.exists() {
        return Err(ConfigError(format!(
            "evaluation database {} does not exist",
            path.display()
        ))
        .into());
    }
    SqliteDatabase::connect(path)
}

fn build_client(settings: &OracleSettings) -> anyhow::Result<Arc<dyn LlmClient>> {
    let model = settings.model_or_default();
    let client: Arc<dyn LlmClient> = match OracleCredentials::from_env(&settings.provider)? {
        OracleCredentials::Watsonx {
            url,
            api_key,
            project_id,
        } => Arc::new(WatsonxClient::new(
            url,
            api_key,
            project_id,
            model,
            settings.temperature,
            settings.max_tokens,
        )),
        OracleCredentials::OpenAi { api_key } => Arc::new(OpenAIClient::new(
            model,
            api_key,
            settings.temperature,
            settings.max_tokens,
        )),
        OracleCredentials::None => Arc::new(FakeClient::new(model).with_fallback(FAKE_ANSWER)),
    };
    tracing::info!(
        event = "oracle.configured",
        provider = client.provider_name(),
        model = client.model()
    );
    Ok(client)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    let mut cfg = resolve_config(args.config.as_deref(), args.strict)?;
    if let Some(db) = &args.database {
        cfg.database = db.clone();
    }
    if let Some(provider) = &args.provider {
        cfg.oracle.provider = provider.clone();
    }
    if args.model.is_some() {
        cfg.oracle.model = args.model.clone();
    }
    if let Some(n) = args.concurrency {
        cfg.settings.concurrency = Some(n);
    }

    let batch = sqlgauge_core::ingest::load_batch(&args.input)?;
    let mode = batch.mode()?;

    // credentials are only required when an oracle-backed group will run
    let client = if mode.needs_oracle() {
        Some(build_client(&cfg.oracle)?)
    } else {
        None
    };

    let db = open_database(&cfg.database)?;
    let timeout = cfg.oracle.timeout();
    let deps = AnalyzerDeps {
        db: Arc::new(db.clone()),
        entity: client.clone().map(|c| {
            Arc::new(LlmEntityExtractor::new(c, timeout, cfg.settings.cache_entries()))
                as Arc<dyn EntityOracle>
        }),
        equivalence: client.map(|c| {
            Arc::new(LlmEquivalenceJudge::new(c, timeout)) as Arc<dyn EquivalenceOracle>
        }),
        comparator: Arc::new(TabularComparator),
        concurrency: cfg.settings.concurrency(),
        comparison_timeout: timeout,
        sample_interval: cfg.settings.sample_interval(),
    };

    let runner = Runner::new(default_analyzers(deps));
    let report = runner.run_batch(&batch).await;
    db.close()?;
    let report = report?;

    sqlgauge_core::report::console::print_summary(&report);
    sqlgauge_core::report::json::write_json(&report, &args.out)?;
    eprintln!("wrote report: {}", args.out.display());

    Ok(exit_codes::OK)
}
