//! Sistema de eventos para observabilidade da rodada

use async_trait::async_trait;
use crate::error::Result;
use crate::traits::EventEmitter;
use crate::types::RunEvent;
use tracing::{error, info, warn};

/// Implementação de EventEmitter que loga eventos
#[derive(Debug, Clone, Default)]
pub struct LoggingEventEmitter;

impl LoggingEventEmitter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventEmitter for LoggingEventEmitter {
    async fn emit(&self, event: RunEvent) -> Result<()> {
        match event {
            RunEvent::Started { run_id, mode, timestamp } => {
                info!(
                    run_id = %run_id,
                    mode = %mode,
                    timestamp = ?timestamp,
                    "Rodada iniciada"
                );
            }
            RunEvent::StateChanged {
                run_id,
                old_state,
                new_state,
                ..
            } => {
                info!(
                    run_id = %run_id,
                    old_state = %old_state,
                    new_state = %new_state,
                    "Estado da rodada alterado"
                );
            }
            RunEvent::TablesDiscovered { run_id, tables } => {
                info!(run_id = %run_id, tables = ?tables, "Tabelas a processar");
            }
            RunEvent::TableSkipped { run_id, table } => {
                warn!(
                    run_id = %run_id,
                    table = %table,
                    "Nenhuma linha na tabela {}, carga ignorada",
                    table
                );
            }
            RunEvent::TableLoaded {
                run_id,
                result,
                nulled_timestamps,
            } => {
                if nulled_timestamps > 0 {
                    warn!(
                        run_id = %run_id,
                        table = %result.table,
                        nulled = nulled_timestamps,
                        "Timestamps inválidos convertidos em nulo"
                    );
                }
                info!(
                    run_id = %run_id,
                    table = %result.table,
                    rows = result.rows_loaded,
                    total = result.total_rows_after,
                    "Tabela carregada"
                );
            }
            RunEvent::TableFailed { run_id, table, error } => {
                error!(
                    run_id = %run_id,
                    table = %table,
                    error = %error,
                    "Falha ao processar a tabela {}",
                    table
                );
            }
            RunEvent::ArtifactDeleted { run_id, artifact } => {
                info!(run_id = %run_id, artifact = %artifact, "Artefato antigo removido");
            }
            RunEvent::Completed { run_id, summary, .. } => {
                info!(
                    run_id = %run_id,
                    mode = %summary.mode,
                    succeeded = ?summary.succeeded(),
                    skipped = ?summary.skipped(),
                    failed = ?summary.failed(),
                    artifacts_deleted = summary.artifacts_deleted,
                    execution_time_ms = summary.execution_time_ms,
                    "Rodada concluída"
                );
            }
        }

        Ok(())
    }
}

/// EventEmitter que armazena eventos em memória para testes
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventEmitter {
    events: std::sync::Arc<std::sync::Mutex<Vec<RunEvent>>>,
}

impl InMemoryEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retorna todos os eventos capturados
    pub fn get_events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Limpa todos os eventos armazenados
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl EventEmitter for InMemoryEventEmitter {
    async fn emit(&self, event: RunEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoadResult, RunMode, RunState, RunSummary, TableOutcome};
    use std::time::SystemTime;

    fn loaded(table: &str) -> LoadResult {
        LoadResult {
            table: table.to_string(),
            rows_loaded: 3,
            total_rows_after: 10,
        }
    }

    #[tokio::test]
    async fn test_logging_emitter_accepts_every_outcome() {
        let emitter = LoggingEventEmitter::new();
        let mut summary = RunSummary::new(RunMode::Incremental);
        summary.tables.push(TableOutcome::Skipped {
            table: "servers_temp".to_string(),
        });

        let events = vec![
            RunEvent::TableSkipped {
                run_id: "run_1".to_string(),
                table: "servers_temp".to_string(),
            },
            RunEvent::TableLoaded {
                run_id: "run_1".to_string(),
                result: loaded("daily_log"),
                nulled_timestamps: 2,
            },
            RunEvent::TableFailed {
                run_id: "run_1".to_string(),
                table: "backup_log".to_string(),
                error: "[QUERY_ERROR] tabela inexistente".to_string(),
            },
            RunEvent::Completed {
                run_id: "run_1".to_string(),
                summary,
                timestamp: SystemTime::now(),
            },
        ];

        for event in events {
            assert!(emitter.emit(event).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_in_memory_emitter_shared_between_clones() {
        let emitter = InMemoryEventEmitter::new();
        let handle = emitter.clone();

        emitter
            .emit(RunEvent::StateChanged {
                run_id: "run_1".to_string(),
                old_state: RunState::Idle,
                new_state: RunState::DiscoverTables,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();
        emitter
            .emit(RunEvent::TableLoaded {
                run_id: "run_1".to_string(),
                result: loaded("daily_log"),
                nulled_timestamps: 0,
            })
            .await
            .unwrap();

        assert_eq!(handle.event_count(), 2);
        assert!(matches!(
            &handle.get_events()[1],
            RunEvent::TableLoaded { result, .. } if result.table == "daily_log"
        ));

        handle.clear();
        assert_eq!(emitter.event_count(), 0);
    }
}
