use household_ledger_agent::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    execution::{ExecutionEngine, Neo4jExecutor, PostgresExecutor},
    llm,
    memory::{stores_from_settings, ResultCache},
    schema::SchemaDescriptor,
    Settings,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    info!("Household Ledger Agent - API Server");
    info!(port = settings.port, model = %settings.model_label(), "Configuration loaded");

    // Create components
    let generator = llm::from_settings(&settings)?;
    let relational = Arc::new(PostgresExecutor::connect_lazy(
        &settings.database_url,
        settings.db_max_connections,
    )?);
    let graph = Arc::new(Neo4jExecutor::new(
        &settings.neo4j_uri,
        &settings.neo4j_database,
        settings.neo4j_user.clone(),
        settings.neo4j_password.clone(),
    )?);
    let execution_engine = ExecutionEngine::new(relational, graph);
    let (history, cache_store) = stores_from_settings(&settings).await?;
    let cache = ResultCache::new(cache_store);

    let mut orchestrator = Orchestrator::new(
        generator,
        SchemaDescriptor::ledger(),
        execution_engine,
        history,
    );
    if settings.cache_enabled {
        info!("Result cache enabled");
        orchestrator = orchestrator.with_cache(cache.clone());
    }

    let state = ApiState {
        orchestrator: Arc::new(orchestrator),
        manual_cache: cache,
        project: env!("CARGO_PKG_NAME").to_string(),
        model: settings.model_label().to_string(),
    };

    info!("Orchestrator initialized, starting API server");

    start_server(state, settings.port).await?;

    Ok(())
}
