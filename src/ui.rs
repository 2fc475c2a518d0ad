//! Interface de terminal do chunkline: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente a execução
//! de um job e, como [`JobListener`], fecha o spinner e imprime o resumo
//! quando o run termina.

use anyhow::Result;
use async_trait::async_trait;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::listener::JobListener;
use crate::result::{JobResult, RunRecord};
use crate::state_machine::{JobStatus, RunId};
use crate::step::StepStatus;

/// Indicador visual de progresso para a execução de um job no terminal.
///
/// Exibe um spinner animado durante o processamento e mensagens coloridas
/// para sucesso (verde) e falha (vermelho).
pub struct JobProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    // Estilo verde para sucesso.
    green: Style,
    // Estilo vermelho para falha.
    red: Style,
    // Estilo amarelo para contadores de skip/rollback.
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com o nome do job e o run id.
    pub fn start(job_name: &str, run_id: RunId) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("RUNNING {job_name} (run {run_id})"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Uma linha por step com os contadores finais.
    fn print_steps(&self, result: &JobResult) {
        for step in &result.steps {
            let (mark, style) = match step.status {
                StepStatus::Completed => ("✓", &self.green),
                StepStatus::Failed => ("✗", &self.red),
            };
            let c = &step.counters;
            println!(
                "  {} {}: read={} write={} {}",
                style.apply_to(mark),
                step.name,
                c.read_count,
                c.write_count,
                self.yellow
                    .apply_to(format!("skip={} rollback={}", c.skip_count, c.rollback_count)),
            );
        }
    }

    /// Imprime o registro do run formatado em JSON com estilo colorido.
    pub fn print_record(&self, record: &RunRecord) {
        let status_style = match record.status {
            JobStatus::Completed => &self.green,
            JobStatus::Failed => &self.red,
            JobStatus::Running => &self.yellow,
        };
        println!();
        println!("{}", status_style.apply_to("─── Run Record ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(record).unwrap_or_default()
        );
    }
}

#[async_trait]
impl JobListener for JobProgress {
    /// Finaliza o spinner e exibe o resultado final do job.
    async fn after_job(&self, result: &JobResult) -> Result<()> {
        self.pb.finish_and_clear();
        match (&result.status, &result.error) {
            (JobStatus::Completed, _) => println!(
                "  {} {} run {} completed in {}ms",
                self.green.apply_to("✓"),
                result.job_name,
                result.run_id,
                result.duration_ms()
            ),
            (_, Some(error)) => println!(
                "  {} {} run {} failed: {error}",
                self.red.apply_to("✗"),
                result.job_name,
                result.run_id
            ),
            (status, None) => println!(
                "  {} {} run {} ended {status}",
                self.red.apply_to("✗"),
                result.job_name,
                result.run_id
            ),
        }
        self.print_steps(result);
        self.print_record(&RunRecord::from(result));
        Ok(())
    }
}

/// Imprime uma linha por run do histórico, do mais recente ao mais antigo.
pub fn print_history(records: &[RunRecord]) {
    if records.is_empty() {
        println!("{}", Style::new().dim().apply_to("no runs recorded"));
        return;
    }
    for record in records {
        let style = match record.status {
            JobStatus::Completed => Style::new().green(),
            JobStatus::Failed => Style::new().red(),
            JobStatus::Running => Style::new().yellow(),
        };
        let written: u64 = record.steps.iter().map(|s| s.counters.write_count).sum();
        println!(
            "{:>6}  {:<16} {} {}  written={}{}",
            record.run_id.get(),
            record.job_name,
            style.apply_to(format!("{:<10}", record.status.to_string())),
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            written,
            record
                .error
                .as_deref()
                .map(|e| format!("  error: {e}"))
                .unwrap_or_default(),
        );
    }
}
