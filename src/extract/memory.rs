//! # Memory Extractor
//!
//! Origem em memória com a mesma semântica de janela do extrator MySQL.
//! Útil para testes e para ensaiar regras de transformação sem banco.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use crate::error::{ETLError, ExtractError, Result};
use crate::extract::{normalize_temporal, RunWindow};
use crate::schema::TableSpec;
use crate::traits::Extractor;
use crate::types::{DataRow, Relation, RunMode};

/// Extrator que serve tabelas mantidas em memória
#[derive(Debug, Clone, Default)]
pub struct MemoryExtractor {
    tables: Arc<Mutex<HashMap<String, Relation>>>,
    /// Tabelas listadas no catálogo mas que falham na leitura
    broken: Vec<String>,
    unavailable: bool,
    extractions: Arc<Mutex<Vec<String>>>,
}

impl MemoryExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona uma tabela com suas linhas
    pub fn with_table(self, name: impl Into<String>, rows: Relation) -> Self {
        self.tables.lock().unwrap().insert(name.into(), rows);
        self
    }

    /// Lista a tabela no catálogo, mas rejeita a consulta
    pub fn with_broken_table(mut self, name: impl Into<String>) -> Self {
        self.broken.push(name.into());
        self
    }

    /// Simula uma origem fora do ar
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Tabelas extraídas até agora, na ordem
    pub fn extractions(&self) -> Vec<String> {
        self.extractions.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(ETLError::Extract(ExtractError::SourceUnavailable(
                "origem em memória marcada como indisponível".to_string(),
            )));
        }
        Ok(())
    }

    fn in_window(row: &DataRow, table: &TableSpec, window: &RunWindow) -> bool {
        if window.mode == RunMode::Full {
            return true;
        }
        match &table.date_column {
            Some(column) => row
                .get(column)
                .and_then(|v| v.as_datetime())
                .map(|dt| window.includes(dt.date()))
                .unwrap_or(false),
            None => true,
        }
    }
}

#[async_trait]
impl Extractor for MemoryExtractor {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let mut names: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
        names.extend(self.broken.iter().cloned());
        names.sort();
        Ok(names)
    }

    async fn extract(&self, table: &TableSpec, window: &RunWindow) -> Result<Relation> {
        self.check_available()?;
        self.extractions
            .lock()
            .unwrap()
            .push(table.logical_name.clone());

        if self.broken.contains(&table.logical_name) {
            return Err(ETLError::Extract(ExtractError::Query {
                table: table.logical_name.clone(),
                message: format!("Table '{}' doesn't exist", table.logical_name),
            }));
        }

        let rows = self
            .tables
            .lock()
            .unwrap()
            .get(&table.logical_name)
            .cloned()
            .ok_or_else(|| {
                ETLError::Extract(ExtractError::Query {
                    table: table.logical_name.clone(),
                    message: format!("Table '{}' doesn't exist", table.logical_name),
                })
            })?;

        let mut selected: Relation = rows
            .into_iter()
            .filter(|row| Self::in_window(row, table, window))
            .collect();
        normalize_temporal(&mut selected);

        tracing::info!(
            table = %table.logical_name,
            rows = selected.len(),
            "Extração em memória concluída"
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use crate::types::DataValue;
    use chrono::NaiveDate;

    fn row(id: i64, date: &str) -> DataRow {
        let mut row = DataRow::new();
        row.insert("ID".to_string(), DataValue::Integer(id));
        row.insert(
            "backup_date".to_string(),
            DataValue::Date(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()),
        );
        row
    }

    fn spec() -> TableSpec {
        TableSpec::new(
            "daily_log",
            vec![
                FieldSpec::new("ID", FieldType::Integer),
                FieldSpec::new("BackupDate", FieldType::Timestamp),
            ],
            None,
        )
        .unwrap()
    }

    fn window(mode: RunMode) -> RunWindow {
        let started = NaiveDate::from_ymd_opt(2025, 3, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        RunWindow::new(mode, started)
    }

    #[tokio::test]
    async fn test_incremental_selects_only_yesterday() {
        let extractor = MemoryExtractor::new().with_table(
            "daily_log",
            vec![row(1, "2025-03-13"), row(2, "2025-03-14"), row(3, "2025-03-15")],
        );

        let rows = extractor
            .extract(&spec(), &window(RunMode::Incremental))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ID"], DataValue::Integer(2));
        assert_eq!(rows[0]["backup_date"], DataValue::from("2025-03-14"));
    }

    #[tokio::test]
    async fn test_full_selects_all_rows() {
        let extractor = MemoryExtractor::new().with_table(
            "daily_log",
            vec![row(1, "2025-03-13"), row(2, "2025-03-14")],
        );

        let rows = extractor.extract(&spec(), &window(RunMode::Full)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(extractor.extractions(), vec!["daily_log"]);
    }

    #[tokio::test]
    async fn test_broken_and_unavailable_sources() {
        let extractor = MemoryExtractor::new().with_broken_table("daily_log");
        assert_eq!(extractor.list_tables().await.unwrap(), vec!["daily_log"]);
        let err = extractor.extract(&spec(), &window(RunMode::Full)).await.unwrap_err();
        assert_eq!(err.error_code(), "QUERY_ERROR");

        let extractor = MemoryExtractor::new().unavailable();
        let err = extractor.list_tables().await.unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }
}
