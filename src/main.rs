use anyhow::Context;
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use inventory_etl::config::{AppConfig, Credentials, StagingStrategy};
use inventory_etl::extract::mysql::MySqlExtractor;
use inventory_etl::extract::RunWindow;
use inventory_etl::load::bigquery::BigQueryWarehouse;
use inventory_etl::load::{DirectoryStaging, MemoryStaging, WarehouseLoader};
use inventory_etl::prelude::*;
use inventory_etl::{logging, report};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Copia as tabelas de inventário de backups do MySQL para o BigQuery
#[derive(Debug, Parser)]
#[command(name = "inventory-etl", version, about)]
struct Cli {
    /// Rodada incremental: somente as linhas de ontem, acrescentadas ao destino
    #[arg(long)]
    daily: bool,

    /// Arquivo TOML de configuração (sobreposto por variáveis ETL_*)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Gera o relatório diário de volume de backups
    Report {
        /// Data do relatório (YYYY-MM-DD); padrão: hoje em UTC
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn loader_for(config: &AppConfig, warehouse: Arc<BigQueryWarehouse>) -> WarehouseLoader {
    let loader = WarehouseLoader::new(warehouse).with_timeout(config.load_timeout());
    match config.staging.strategy {
        StagingStrategy::Direct => loader,
        StagingStrategy::File => {
            loader.with_staging(Arc::new(DirectoryStaging::new(&config.staging.dir)))
        }
        StagingStrategy::Memory => loader.with_staging(Arc::new(MemoryStaging::new())),
    }
}

async fn run_pipeline(config: &AppConfig, mode: RunMode) -> anyhow::Result<RunSummary> {
    let window = RunWindow::starting_now(mode);

    let registry = Arc::new(
        SchemaRegistry::load(&config.schema.path).context("registro de schemas")?,
    );
    let credentials =
        Credentials::from_file(&config.source.credentials_path).context("credenciais da origem")?;
    let extractor = MySqlExtractor::new(&config.source, &credentials);
    let warehouse = Arc::new(BigQueryWarehouse::new(&config.warehouse).context("warehouse")?);

    let context = RunContext::builder(window, registry.clone())
        .allow_list(config.tables.clone())
        .retention(config.retention())
        .extractor(extractor)
        .transformer(RuleTransformer::new(registry))
        .loader(loader_for(config, warehouse))
        .staging(Arc::new(DirectoryStaging::new(&config.staging.dir)))
        .event_emitter(LoggingEventEmitter::new())
        .build()?;

    Ok(Pipeline::new(context).execute().await?)
}

async fn run_report(config: &AppConfig, date: NaiveDate) -> anyhow::Result<()> {
    let credentials =
        Credentials::from_file(&config.source.credentials_path).context("credenciais da origem")?;
    let source = MySqlExtractor::new(&config.source, &credentials);
    let warehouse = Arc::new(BigQueryWarehouse::new(&config.warehouse).context("warehouse")?);
    let loader = loader_for(config, warehouse);

    match report::run_daily_report(&source, &loader, date).await? {
        Some(result) => tracing::info!(
            rows = result.rows_loaded,
            total = result.total_rows_after,
            "Relatório diário de {} carregado",
            date
        ),
        None => tracing::warn!("Relatório diário de {} vazio", date),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // erros de configuração são fatais antes de qualquer rodada
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuração inválida: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging, Local::now().date_naive());

    let outcome = match cli.command {
        Some(Command::Report { date }) => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            run_report(&config, date).await.map(|_| true)
        }
        None => {
            let mode = RunMode::from_daily_flag(cli.daily);
            run_pipeline(&config, mode)
                .await
                .map(|summary| summary.is_success())
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Rodada abortada");
            ExitCode::FAILURE
        }
    }
}
