//! # Extract
//!
//! Leitura das tabelas de inventário no banco de origem.
//!
//! A janela da rodada ([`RunWindow`]) é calculada uma única vez no início da execução,
//! de forma que todas as tabelas processadas na mesma rodada compartilhem o mesmo
//! corte de "ontem". Logo após a extração, todo valor temporal é convertido para a
//! forma textual canônica (`YYYY-MM-DD HH:MM:SS`), e a relação nunca carrega datas
//! nativas além desta fronteira.

pub mod memory;

#[cfg(feature = "mysql")]
pub mod mysql;

use chrono::{Local, NaiveDate, NaiveDateTime};
use crate::error::{ETLError, ExtractError, Result};
use crate::schema::{TableSpec, DEFAULT_QUERY_TEMPLATE};
use crate::types::{
    DataValue, Relation, RunMode, CANONICAL_DATETIME_FORMAT, CANONICAL_DATE_FORMAT,
};

/// Janela de extração compartilhada por todas as tabelas de uma rodada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub mode: RunMode,
    pub started_at: NaiveDateTime,
    /// Dia anterior ao início da rodada
    pub yesterday: NaiveDate,
}

impl RunWindow {
    pub fn new(mode: RunMode, started_at: NaiveDateTime) -> Self {
        let today = started_at.date();
        Self {
            mode,
            started_at,
            yesterday: today.pred_opt().unwrap_or(today),
        }
    }

    /// Janela a partir do relógio local
    pub fn starting_now(mode: RunMode) -> Self {
        Self::new(mode, Local::now().naive_local())
    }

    /// Verifica se uma linha com esta data pertence à janela
    pub fn includes(&self, date: NaiveDate) -> bool {
        match self.mode {
            RunMode::Full => true,
            RunMode::Incremental => date == self.yesterday,
        }
    }
}

/// Nomes de tabela/coluna aceitos na montagem da consulta
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Monta a consulta da tabela para a janela da rodada
pub fn build_query(table: &TableSpec, window: &RunWindow) -> Result<String> {
    let rejected = |message: String| {
        ETLError::Extract(ExtractError::Query {
            table: table.logical_name.clone(),
            message,
        })
    };

    if !is_safe_identifier(&table.logical_name) {
        return Err(rejected("nome de tabela inválido".to_string()));
    }

    let base = table.base_query();

    let date_column = match (window.mode, &table.date_column) {
        (RunMode::Incremental, Some(column)) => column,
        _ => return Ok(base),
    };

    if !is_safe_identifier(date_column) {
        return Err(rejected(format!("coluna de data inválida: {}", date_column)));
    }

    let day = window.yesterday.format(CANONICAL_DATE_FORMAT);
    if table.source_query_template == DEFAULT_QUERY_TEMPLATE {
        Ok(format!("{} WHERE DATE(`{}`) = '{}'", base, date_column, day))
    } else {
        Ok(format!(
            "SELECT * FROM ({}) AS src WHERE DATE(src.`{}`) = '{}'",
            base, date_column, day
        ))
    }
}

/// Converte valores temporais nativos para a forma textual canônica
pub fn normalize_temporal(rows: &mut Relation) {
    for row in rows.iter_mut() {
        for value in row.values_mut() {
            let canonical = match value {
                DataValue::Date(d) => d.format(CANONICAL_DATE_FORMAT).to_string(),
                DataValue::DateTime(dt) => dt.format(CANONICAL_DATETIME_FORMAT).to_string(),
                DataValue::Timestamp(ts) => ts.format(CANONICAL_DATETIME_FORMAT).to_string(),
                _ => continue,
            };
            *value = DataValue::String(canonical);
        }
    }
}
