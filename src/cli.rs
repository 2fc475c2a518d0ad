//! Interface de linha de comando do chunkline baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (import, history, demo)
//! e flags globais (--config, --chunk-size, --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// chunkline: jobs em lote orientados a chunks com histórico de runs.
#[derive(Debug, Parser)]
#[command(name = "chunkline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração TOML.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Sobrescreve o número de itens gravados por chunk.
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Número máximo de retentativas por chunk.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Importa pessoas de um CSV sem cabeçalho (first_name,last_name).
    Import {
        /// Arquivo CSV de entrada.
        file: PathBuf,

        /// Banco SQLite onde a tabela `people` é gravada.
        #[arg(long, default_value = "people.db")]
        people_db: PathBuf,

        /// Run id explícito; por padrão o próximo id livre é usado.
        #[arg(long)]
        run_id: Option<i64>,
    },

    /// Lista os runs mais recentes do histórico.
    History {
        /// Quantidade máxima de runs exibidos.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Executa a demonstração embutida com um job em memória.
    Demo,
}
