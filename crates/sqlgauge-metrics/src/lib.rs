use std::sync::Arc;
use std::time::Duration;

use sqlgauge_core::database::Database;
use sqlgauge_core::metrics_api::Analyzer;
use sqlgauge_core::oracle::{DataComparator, EntityOracle, EquivalenceOracle};

pub mod entity_match;
pub mod equivalence;
pub mod halstead;
pub mod injection;
pub mod lexer;
pub mod performance;
pub mod profiler;
pub mod retrieval;
pub mod set_match;

/// Collaborators the analyzers are built from. Oracles are optional: a batch
/// that never reaches an oracle-backed group needs no credentials.
pub struct AnalyzerDeps {
    pub db: Arc<dyn Database>,
    pub entity: Option<Arc<dyn EntityOracle>>,
    pub equivalence: Option<Arc<dyn EquivalenceOracle>>,
    pub comparator: Arc<dyn DataComparator>,
    pub concurrency: usize,
    pub comparison_timeout: Duration,
    pub sample_interval: Duration,
}

pub fn default_analyzers(deps: AnalyzerDeps) -> Vec<Arc<dyn Analyzer>> {
    let mut analyzers: Vec<Arc<dyn Analyzer>> = vec![
        Arc::new(halstead::ComplexityAnalyzer),
        Arc::new(injection::InjectionAnalyzer),
        Arc::new(performance::PerformanceAnalyzer::new(
            deps.db.clone(),
            profiler::Profiler::new(deps.sample_interval),
        )),
        Arc::new(retrieval::RetrievalAnalyzer::new(
            deps.db,
            deps.comparator,
            deps.concurrency,
            deps.comparison_timeout,
        )),
    ];
    if let Some(entity) = deps.entity {
        analyzers.push(Arc::new(entity_match::EntityMatchAnalyzer::new(entity)));
    }
    if let Some(judge) = deps.equivalence {
        analyzers.push(Arc::new(equivalence::EquivalenceAnalyzer::new(judge)));
    }
    analyzers
}
