use crate::error::{ConfigError, ETLError, Result};
use crate::events::LoggingEventEmitter;
use crate::extract::RunWindow;
use crate::schema::SchemaRegistry;
use crate::traits::{EventEmitter, Extractor, Loader, StagingStore, Transformer};
use crate::transform::RuleTransformer;
use crate::types::{RunEvent, RunMode, RunState, RunSummary, TableOutcome};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Retenção padrão dos artefatos de staging
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Contexto explícito de uma rodada, montado uma vez no início do processo
///
/// Reúne o modo, o corte de "ontem", o registro de schemas e os colaboradores.
/// Nada aqui muda depois de construído.
pub struct RunContext {
    pub run_id: String,
    pub window: RunWindow,
    pub registry: Arc<SchemaRegistry>,
    /// Únicas tabelas elegíveis, na ordem de processamento
    pub allow_list: Vec<String>,
    pub retention: Duration,
    pub extractor: Arc<dyn Extractor>,
    pub transformer: Arc<dyn Transformer>,
    pub loader: Arc<dyn Loader>,
    /// Área varrida pela limpeza por retenção
    pub staging: Option<Arc<dyn StagingStore>>,
    pub event_emitter: Arc<dyn EventEmitter>,
}

impl RunContext {
    pub fn builder(window: RunWindow, registry: Arc<SchemaRegistry>) -> RunContextBuilder {
        RunContextBuilder::new(window, registry)
    }

    pub fn mode(&self) -> RunMode {
        self.window.mode
    }
}

/// Builder do contexto da rodada
pub struct RunContextBuilder {
    window: RunWindow,
    registry: Arc<SchemaRegistry>,
    run_id: Option<String>,
    allow_list: Option<Vec<String>>,
    retention: Duration,
    extractor: Option<Arc<dyn Extractor>>,
    transformer: Option<Arc<dyn Transformer>>,
    loader: Option<Arc<dyn Loader>>,
    staging: Option<Arc<dyn StagingStore>>,
    event_emitter: Option<Arc<dyn EventEmitter>>,
}

impl RunContextBuilder {
    pub fn new(window: RunWindow, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            window,
            registry,
            run_id: None,
            allow_list: None,
            retention: DEFAULT_RETENTION,
            extractor: None,
            transformer: None,
            loader: None,
            staging: None,
            event_emitter: None,
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sem allow-list explícita, vale o conjunto de tabelas do registro
    pub fn allow_list<S: Into<String>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
        self.allow_list = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn extractor<E: Extractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    pub fn transformer<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    pub fn loader<L: Loader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn staging(mut self, staging: Arc<dyn StagingStore>) -> Self {
        self.staging = Some(staging);
        self
    }

    pub fn event_emitter<EM: EventEmitter + 'static>(mut self, emitter: EM) -> Self {
        self.event_emitter = Some(Arc::new(emitter));
        self
    }

    pub fn build(self) -> Result<RunContext> {
        let missing =
            |name: &str| ETLError::Config(ConfigError::MissingRequiredParameter(name.to_string()));

        let extractor = self.extractor.ok_or_else(|| missing("extractor"))?;
        let loader = self.loader.ok_or_else(|| missing("loader"))?;
        let transformer = self
            .transformer
            .unwrap_or_else(|| Arc::new(RuleTransformer::new(self.registry.clone())));
        let allow_list = self.allow_list.unwrap_or_else(|| {
            self.registry
                .table_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        });

        Ok(RunContext {
            run_id: self.run_id.unwrap_or_else(|| {
                format!("run_{}", self.window.started_at.format("%Y%m%d_%H%M%S"))
            }),
            window: self.window,
            registry: self.registry,
            allow_list,
            retention: self.retention,
            extractor,
            transformer,
            loader,
            staging: self.staging,
            event_emitter: self
                .event_emitter
                .unwrap_or_else(|| Arc::new(LoggingEventEmitter::new())),
        })
    }
}

/// Orquestrador: DISCOVER_TABLES → PROCESS_TABLE* → CLEANUP → DONE
///
/// As tabelas são processadas em sequência. A falha de uma tabela é registrada e
/// não interrompe as demais; o resumo final indica se alguma falhou.
pub struct Pipeline {
    context: RunContext,
    state: Mutex<RunState>,
}

impl Pipeline {
    pub fn new(context: RunContext) -> Self {
        Self {
            context,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Retorna o estado atual da rodada
    pub fn current_state(&self) -> RunState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(RunState::Idle)
    }

    /// Altera o estado da rodada e emite evento
    async fn set_state(&self, new_state: RunState) -> Result<()> {
        let old_state = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ETLError::Pipeline("estado da rodada envenenado".to_string()))?;
            std::mem::replace(&mut *state, new_state.clone())
        };

        self.context
            .event_emitter
            .emit(RunEvent::StateChanged {
                run_id: self.context.run_id.clone(),
                old_state,
                new_state,
                timestamp: SystemTime::now(),
            })
            .await
    }

    /// Executa a rodada usando o relógio atual para a limpeza
    pub async fn execute(&self) -> Result<RunSummary> {
        self.execute_at(SystemTime::now()).await
    }

    /// Executa a rodada; `now` é a referência da limpeza por retenção
    pub async fn execute_at(&self, now: SystemTime) -> Result<RunSummary> {
        let start_time = Instant::now();
        let ctx = &self.context;
        let mut summary = RunSummary::new(ctx.mode());

        ctx.event_emitter
            .emit(RunEvent::Started {
                run_id: ctx.run_id.clone(),
                mode: ctx.mode(),
                timestamp: SystemTime::now(),
            })
            .await?;

        tracing::info!(
            run_id = %ctx.run_id,
            mode = %ctx.mode(),
            yesterday = %ctx.window.yesterday,
            "Iniciando rodada"
        );

        self.set_state(RunState::DiscoverTables).await?;
        let tables = match self.discover_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                // a limpeza por retenção roda mesmo sem origem
                self.set_state(RunState::Cleanup).await?;
                let deleted = self.cleanup(now).await?;
                tracing::error!(
                    error = %e,
                    artifacts_deleted = deleted,
                    "Falha ao descobrir as tabelas da origem"
                );
                self.set_state(RunState::Failed(e.to_string())).await?;
                return Err(e);
            }
        };

        for table in &tables {
            self.set_state(RunState::ProcessTable(table.clone())).await?;
            let outcome = self.process_table(table).await;
            self.emit_outcome(&outcome).await?;
            summary.tables.push(outcome);
        }

        self.set_state(RunState::Cleanup).await?;
        summary.artifacts_deleted = self.cleanup(now).await?;
        summary.execution_time_ms = start_time.elapsed().as_millis() as u64;

        if summary.is_success() {
            self.set_state(RunState::Done).await?;
            tracing::info!(
                succeeded = ?summary.succeeded(),
                skipped = ?summary.skipped(),
                "Rodada concluída. Sucesso: {:?}; ignoradas: {:?}; falhas: []",
                summary.succeeded(),
                summary.skipped()
            );
        } else {
            let failed = summary.failed().join(", ");
            self.set_state(RunState::Failed(format!("tabelas com falha: {}", failed)))
                .await?;
            tracing::error!(
                succeeded = ?summary.succeeded(),
                skipped = ?summary.skipped(),
                failed = ?summary.failed(),
                "Rodada com falhas. Sucesso: {:?}; ignoradas: {:?}; falhas: {:?}",
                summary.succeeded(),
                summary.skipped(),
                summary.failed()
            );
        }

        ctx.event_emitter
            .emit(RunEvent::Completed {
                run_id: ctx.run_id.clone(),
                summary: summary.clone(),
                timestamp: SystemTime::now(),
            })
            .await?;

        Ok(summary)
    }

    /// Catálogo da origem filtrado pela allow-list, na ordem da allow-list
    async fn discover_tables(&self) -> Result<Vec<String>> {
        let ctx = &self.context;
        let catalog = ctx.extractor.list_tables().await?;

        let mut tables = Vec::new();
        for table in &ctx.allow_list {
            if catalog.iter().any(|t| t == table) {
                tables.push(table.clone());
            } else {
                tracing::warn!(table = %table, "Tabela da allow-list não existe na origem");
            }
        }

        let ignored = catalog
            .iter()
            .filter(|t| !ctx.allow_list.contains(t))
            .count();
        tracing::debug!(ignored, "Tabelas fora da allow-list ignoradas");

        ctx.event_emitter
            .emit(RunEvent::TablesDiscovered {
                run_id: ctx.run_id.clone(),
                tables: tables.clone(),
            })
            .await?;
        Ok(tables)
    }

    /// Extrai, transforma e carrega uma tabela; qualquer erro vira `Failed`
    async fn process_table(&self, table: &str) -> TableOutcome {
        match self.try_process_table(table).await {
            Ok(outcome) => outcome,
            Err(e) => TableOutcome::Failed {
                table: table.to_string(),
                code: e.error_code(),
                message: e.to_string(),
            },
        }
    }

    async fn try_process_table(&self, table: &str) -> Result<TableOutcome> {
        let ctx = &self.context;
        let spec = ctx.registry.get_schema(table)?;

        if ctx.mode() == RunMode::Incremental && spec.date_column.is_none() {
            tracing::warn!(
                table = %table,
                "Tabela sem coluna de data; modo incremental seleciona todas as linhas"
            );
        }

        let rows = ctx.extractor.extract(spec, &ctx.window).await?;
        if rows.is_empty() {
            tracing::warn!(table = %table, "Nenhuma linha extraída de {}, carga ignorada", table);
            return Ok(TableOutcome::Skipped {
                table: table.to_string(),
            });
        }

        let (rows, report) = ctx.transformer.transform_with_report(rows, table).await?;
        for (column, count) in &report.nulled_timestamps {
            tracing::warn!(
                table = %table,
                column = %column,
                count,
                "{} valores de {} convertidos em nulo",
                count,
                column
            );
        }

        let result = ctx.loader.load(rows, spec, ctx.mode().write_mode()).await?;
        Ok(TableOutcome::Loaded {
            result,
            nulled_timestamps: report.total_nulled(),
        })
    }

    async fn emit_outcome(&self, outcome: &TableOutcome) -> Result<()> {
        let run_id = self.context.run_id.clone();
        let event = match outcome {
            TableOutcome::Loaded {
                result,
                nulled_timestamps,
            } => RunEvent::TableLoaded {
                run_id,
                result: result.clone(),
                nulled_timestamps: *nulled_timestamps,
            },
            TableOutcome::Skipped { table } => RunEvent::TableSkipped {
                run_id,
                table: table.clone(),
            },
            TableOutcome::Failed { table, code, message } => RunEvent::TableFailed {
                run_id,
                table: table.clone(),
                error: format!("[{}] {}", code, message),
            },
        };
        self.context.event_emitter.emit(event).await
    }

    /// Remove artefatos mais antigos que a retenção; falhas só são logadas
    async fn cleanup(&self, now: SystemTime) -> Result<usize> {
        let ctx = &self.context;
        let staging = match &ctx.staging {
            Some(staging) => staging,
            None => return Ok(0),
        };

        let stale = match staging.list_older_than(ctx.retention, now).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::error!(error = %e, "Falha ao listar artefatos de staging");
                return Ok(0);
            }
        };

        let mut deleted = 0;
        for artifact in stale {
            match staging.delete(&artifact).await {
                Ok(()) => {
                    deleted += 1;
                    ctx.event_emitter
                        .emit(RunEvent::ArtifactDeleted {
                            run_id: ctx.run_id.clone(),
                            artifact: artifact.id.clone(),
                        })
                        .await?;
                }
                Err(e) => {
                    tracing::error!(artifact = %artifact, error = %e, "Falha ao remover artefato");
                }
            }
        }
        Ok(deleted)
    }
}
