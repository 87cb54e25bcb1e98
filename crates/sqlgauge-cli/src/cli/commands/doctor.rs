use super::{exit_codes, open_database, resolve_config};
use crate::cli::args::DoctorArgs;
use serde_json::json;
use sqlgauge_core::config::{OracleCredentials, OPENAI_VARS, WATSONX_VARS};
use sqlgauge_core::database::Database;

fn present(var: &str) -> bool {
    std::env::var(var)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

pub async fn run(args: DoctorArgs) -> anyhow::Result<i32> {
    let mut cfg = resolve_config(args.config.as_deref(), false)?;
    if let Some(db) = &args.database {
        cfg.database = db.clone();
    }

    let credentials: Vec<(&str, bool)> = WATSONX_VARS
        .iter()
        .chain(OPENAI_VARS.iter())
        .map(|v| (*v, present(v)))
        .collect();
    let provider_ready = OracleCredentials::from_env(&cfg.oracle.provider);

    let database = match open_database(&cfg.database) {
        Ok(db) => {
            let tables = db.execute_with_results("SELECT name FROM sqlite_master WHERE type = 'table'");
            db.close()?;
            tables.map(|rs| rs.len())
        }
        Err(e) => Err(e),
    };

    let rendered = if args.format == "json" {
        serde_json::to_string_pretty(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "provider": cfg.oracle.provider,
            "provider_ready": provider_ready.is_ok(),
            "credentials": credentials
                .iter()
                .map(|(k, ok)| (k.to_string(), json!(ok)))
                .collect::<serde_json::Map<_, _>>(),
            "database": cfg.database.display().to_string(),
            "database_tables": database.as_ref().ok(),
            "database_error": database.as_ref().err().map(|e| format!("{:#}", e)),
        }))?
    } else {
        let mut s = String::new();
        s.push_str(&format!("SQLGauge Doctor (v{})\n", env!("CARGO_PKG_VERSION")));
        s.push_str(&format!("Oracle provider: {}\n", cfg.oracle.provider));
        for (var, ok) in &credentials {
            s.push_str(&format!("  {} {}\n", if *ok { "✅" } else { "⚠️ " }, var));
        }
        if let Err(e) = &provider_ready {
            s.push_str(&format!("  ❌ {}\n", e));
        }
        match &database {
            Ok(n) => s.push_str(&format!(
                "Database: {} ({} tables)\n",
                cfg.database.display(),
                n
            )),
            Err(e) => s.push_str(&format!("Database: ❌ {:#}\n", e)),
        }
        s
    };

    if args.format == "json" {
        println!("{}", rendered);
    } else {
        eprintln!("{}", rendered);
    }

    if provider_ready.is_ok() && database.is_ok() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::CONFIG_ERROR)
    }
}
