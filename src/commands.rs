//! Handlers dos subcomandos da CLI.
//!
//! Cada handler monta o job, o store e os listeners a partir da
//! configuração e devolve `true` quando o run termina COMPLETED.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use chunkline::config::ChunklineConfig;
use chunkline::item::{CollectingWriter, VecReader};
use chunkline::people::{self, PeopleDb, PeopleReportListener};
use chunkline::ui::{self, JobProgress};
use chunkline::{
    ChunkStep, InMemoryRunStore, Job, JobLauncher, LoggingListener, RunId, RunIdIncrementer,
    RunStore, SqliteRunStore,
};

/// Cancela o launcher ao receber Ctrl-C; o run para na próxima fronteira de chunk.
fn cancel_on_ctrl_c(launcher: &JobLauncher) {
    let token = launcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next chunk boundary");
            token.cancel();
        }
    });
}

/// Importa o CSV para a tabela `people` sob um run id novo ou explícito.
pub async fn import(
    config: &ChunklineConfig,
    file: &Path,
    people_db: &Path,
    run_id: Option<i64>,
) -> Result<bool> {
    let store: Arc<dyn RunStore> = Arc::new(
        SqliteRunStore::open(&config.store_path)
            .with_context(|| format!("failed to open run store {}", config.store_path.display()))?,
    );
    let db = PeopleDb::open(people_db)?;
    let mut job = people::import_job(file, db.clone(), config.chunk_settings()?)?;

    let run_id = match run_id {
        Some(id) => RunId::new(id),
        None => RunIdIncrementer::next(store.as_ref())?,
    };

    let launcher = JobLauncher::new(store)
        .with_listener(Arc::new(JobProgress::start(job.name(), run_id)))
        .with_listener(Arc::new(LoggingListener))
        .with_listener(Arc::new(PeopleReportListener::new(db)));
    cancel_on_ctrl_c(&launcher);

    let result = launcher.run_job(&mut job, run_id).await;
    Ok(result.is_success())
}

/// Lista os runs mais recentes do store configurado.
pub fn history(config: &ChunklineConfig, limit: usize) -> Result<()> {
    let store = SqliteRunStore::open(&config.store_path)
        .with_context(|| format!("failed to open run store {}", config.store_path.display()))?;
    ui::print_history(&store.list_runs(limit)?);
    Ok(())
}

// Pula múltiplos de 7, dobra o resto.
fn double_unless_seventh(n: &u32) -> Result<Option<u32>> {
    Ok((n % 7 != 0).then_some(n * 2))
}

/// Job em memória executado duas vezes com run ids consecutivos.
pub async fn demo(config: &ChunklineConfig) -> Result<bool> {
    let writer = CollectingWriter::new();
    let step = ChunkStep::new(
        "double",
        VecReader::new((1..=25u32).collect::<Vec<_>>()),
        double_unless_seventh,
        writer.clone(),
    )
    .with_settings(config.chunk_settings()?);
    let mut job = Job::builder("demoJob").step(step).build()?;

    let launcher =
        JobLauncher::new(Arc::new(InMemoryRunStore::new())).with_listener(Arc::new(LoggingListener));

    let mut success = true;
    for _ in 0..2 {
        let result = launcher.run_next(&mut job).await?;
        info!(run_id = %result.run_id, status = %result.status, "demo run finished");
        success &= result.is_success();
    }

    println!("batch sizes: {:?}", writer.batch_sizes());
    println!("items written: {}", writer.items().len());
    ui::print_history(&launcher.store().list_runs(10)?);
    Ok(success)
}
