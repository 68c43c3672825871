//! # Warehouse Loader
//!
//! Carregador que serializa a relação em NDJSON e a envia como job de carga.
//!
//! Fluxo por tabela:
//! 1. valida as colunas contra o schema de destino
//! 2. serializa (e, se houver staging, grava e relê o artefato)
//! 3. submete o job com disposição e particionamento diário
//! 4. aguarda o término, opcionalmente com prazo
//! 5. consulta o total de linhas do destino

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use crate::error::{ETLError, LoadError, Result};
use crate::load::ndjson;
use crate::schema::TableSpec;
use crate::traits::{JobOutcome, LoadJobRequest, Loader, StagingStore, Warehouse};
use crate::types::{LoadResult, Relation, WriteMode};

/// Carregador para o warehouse colunar
#[derive(Clone)]
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
    staging: Option<Arc<dyn StagingStore>>,
    timeout: Option<Duration>,
}

impl WarehouseLoader {
    /// Envio direto, sem artefato intermediário
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            staging: None,
            timeout: None,
        }
    }

    /// Grava os registros no staging antes do envio
    pub fn with_staging(mut self, staging: Arc<dyn StagingStore>) -> Self {
        self.staging = Some(staging);
        self
    }

    /// Prazo máximo de espera pelo job
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn records_for_upload(&self, table: &str, records: Vec<u8>) -> Result<Vec<u8>> {
        let staging = match &self.staging {
            Some(staging) => staging,
            None => return Ok(records),
        };

        let artifact = staging.write(table, &records).await?;
        let uploaded = staging.read(&artifact).await;

        if let Err(e) = staging.delete(&artifact).await {
            tracing::warn!(artifact = %artifact, error = %e, "Falha ao remover artefato de staging");
        }
        uploaded
    }

    async fn wait(&self, table: &TableSpec, job: &crate::traits::JobHandle) -> Result<JobOutcome> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return self.warehouse.await_job(job).await,
        };

        tokio::time::timeout(timeout, self.warehouse.await_job(job))
            .await
            .map_err(|_| {
                ETLError::Load(LoadError::Timeout {
                    table: table.logical_name.clone(),
                    job_id: job.job_id.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            })?
    }
}

impl std::fmt::Debug for WarehouseLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseLoader")
            .field("staged", &self.staging.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Loader for WarehouseLoader {
    async fn load(&self, data: Relation, table: &TableSpec, write_mode: WriteMode) -> Result<LoadResult> {
        ndjson::check_columns(&data, table)?;

        let records = ndjson::encode(&data, table)?;
        let records = self.records_for_upload(&table.logical_name, records).await?;

        let request = LoadJobRequest::for_table(table, write_mode);
        let job = self.warehouse.submit_load_job(records, &request).await?;
        tracing::info!(
            table = %table.logical_name,
            job_id = %job.job_id,
            disposition = write_mode.as_disposition(),
            partition = ?table.partition_field,
            "Job de carga submetido"
        );

        match self.wait(table, &job).await? {
            JobOutcome::Succeeded => {}
            JobOutcome::Failed { errors } => {
                return Err(ETLError::Load(LoadError::Job {
                    table: table.logical_name.clone(),
                    message: errors.join("; "),
                }));
            }
        }

        let total_rows_after = self.warehouse.row_count(&table.logical_name).await?;
        tracing::info!(
            table = %table.logical_name,
            rows = data.len(),
            total = total_rows_after,
            "Carregadas {} linhas em {}. Total agora: {}",
            data.len(),
            table.logical_name,
            total_rows_after
        );

        Ok(LoadResult {
            table: table.logical_name.clone(),
            rows_loaded: data.len(),
            total_rows_after,
        })
    }
}
