//! # Memory Warehouse
//!
//! Warehouse em memória com a mesma semântica de disposição do destino real.
//! Especialmente útil para testes do orquestrador e para rodadas de ensaio.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use crate::error::{ETLError, LoadError, Result};
use crate::load::ndjson;
use crate::traits::{JobHandle, JobOutcome, LoadJobRequest, Warehouse};
use crate::types::WriteMode;

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Vec<serde_json::Value>>,
    pending: HashMap<String, (LoadJobRequest, Vec<serde_json::Value>)>,
    requests: Vec<LoadJobRequest>,
    next_job: u64,
}

/// Warehouse que mantém as tabelas de destino em memória
///
/// Os registros só são aplicados quando o job é aguardado, como no destino remoto.
/// Os dados ficam em `Arc<Mutex<>>` e podem ser inspecionados após a rodada.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouse {
    state: Arc<Mutex<State>>,
    /// Tabelas cujo job termina com erro reportado pelo warehouse
    failing: HashSet<String>,
    /// Jobs nunca terminam
    stalled: bool,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faz o job de carga desta tabela falhar
    pub fn failing_table(mut self, table: impl Into<String>) -> Self {
        self.failing.insert(table.into());
        self
    }

    /// Jobs ficam pendentes para sempre
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Pré-carrega linhas em uma tabela de destino
    pub fn seed(&self, table: impl Into<String>, rows: Vec<serde_json::Value>) {
        self.state.lock().unwrap().tables.insert(table.into(), rows);
    }

    /// Cópia das linhas de uma tabela
    pub fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Pedidos de carga recebidos, na ordem
    pub fn requests(&self) -> Vec<LoadJobRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn submit_load_job(&self, records: Vec<u8>, request: &LoadJobRequest) -> Result<JobHandle> {
        let rows = ndjson::decode(&records)?;
        let mut state = self.state.lock().unwrap();
        state.next_job += 1;
        let job_id = format!("job_{}_{}", request.table, state.next_job);

        state.requests.push(request.clone());
        state
            .pending
            .insert(job_id.clone(), (request.clone(), rows));

        Ok(JobHandle {
            job_id,
            location: None,
        })
    }

    async fn await_job(&self, job: &JobHandle) -> Result<JobOutcome> {
        if self.stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        let (request, rows) = state.pending.remove(&job.job_id).ok_or_else(|| {
            ETLError::Load(LoadError::Job {
                table: String::new(),
                message: format!("job desconhecido: {}", job.job_id),
            })
        })?;

        if self.failing.contains(&request.table) {
            return Ok(JobOutcome::Failed {
                errors: vec![format!("Error while reading data for {}", request.table)],
            });
        }

        let table = state.tables.entry(request.table.clone()).or_default();
        match request.write_mode {
            WriteMode::TruncateAndReplace => *table = rows,
            WriteMode::Append => table.extend(rows),
        }
        Ok(JobOutcome::Succeeded)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }
}
