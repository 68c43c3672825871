//! # Daily Report
//!
//! Relatório diário do volume de backups por servidor.
//!
//! Para cada engine (MYSQL, PGSQL, MSSQL) hospedada no GCP, soma o tamanho dos
//! backups do dia por servidor, converte para uma unidade legível e acrescenta o
//! resultado à tabela `daily_report` do warehouse. A consulta só agrega; a
//! conversão de unidade e o indicador de erro são calculados aqui.

use async_trait::async_trait;
use chrono::NaiveDate;
use crate::error::Result;
use crate::schema::{FieldSpec, FieldType, TableSpec};
use crate::traits::Loader;
use crate::types::{DataRow, DataValue, LoadResult, Relation, WriteMode, CANONICAL_DATE_FORMAT};

pub const REPORT_TABLE: &str = "daily_report";
pub const REPORT_ENGINES: [&str; 3] = ["MYSQL", "PGSQL", "MSSQL"];
pub const REPORT_LOCATION: &str = "GCP";

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Soma dos backups de um servidor no dia
#[derive(Debug, Clone, PartialEq)]
pub struct ServerBackupTotal {
    pub server: String,
    pub location: String,
    pub engine: String,
    pub os: Option<String>,
    pub total_bytes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    KB,
    MB,
}

impl SizeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
        }
    }
}

/// Tamanho convertido para a maior unidade com parte inteira não nula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumanSize {
    pub value: f64,
    pub unit: SizeUnit,
}

fn truncate_2(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}

/// Converte bytes em B, KB ou MB, truncando em duas casas
pub fn humanize_size(bytes: f64) -> HumanSize {
    if bytes >= MIB {
        HumanSize {
            value: truncate_2(bytes / MIB),
            unit: SizeUnit::MB,
        }
    } else if bytes >= KIB {
        HumanSize {
            value: truncate_2(bytes / KIB),
            unit: SizeUnit::KB,
        }
    } else {
        HumanSize {
            value: bytes,
            unit: SizeUnit::B,
        }
    }
}

/// Um servidor sem nenhum byte de backup no dia é sinalizado como erro
pub fn is_backup_error(size: &HumanSize) -> bool {
    size.unit == SizeUnit::B && size.value == 0.0
}

/// Especificação da tabela de destino do relatório
pub fn report_table_spec() -> Result<TableSpec> {
    TableSpec::new(
        REPORT_TABLE,
        vec![
            FieldSpec::new("Server", FieldType::String),
            FieldSpec::new("Size", FieldType::Float),
            FieldSpec::new("SizeName", FieldType::String),
            FieldSpec::new("Location", FieldType::String),
            FieldSpec::new("DBEngine", FieldType::String),
            FieldSpec::new("OS", FieldType::String),
            FieldSpec::new("Error", FieldType::String),
            FieldSpec::new("ReportDate", FieldType::String),
        ],
        None,
    )
}

/// Monta as linhas do relatório a partir dos totais por servidor
pub fn build_report(totals: &[ServerBackupTotal], date: NaiveDate) -> Relation {
    let report_date = date.format(CANONICAL_DATE_FORMAT).to_string();

    totals
        .iter()
        .map(|total| {
            let size = humanize_size(total.total_bytes);
            let error = if is_backup_error(&size) { "Yes" } else { "No" };

            let mut row = DataRow::new();
            row.insert("Server".to_string(), DataValue::from(total.server.as_str()));
            row.insert("Size".to_string(), DataValue::Float(size.value));
            row.insert("SizeName".to_string(), DataValue::from(size.unit.as_str()));
            row.insert("Location".to_string(), DataValue::from(total.location.as_str()));
            row.insert("DBEngine".to_string(), DataValue::from(total.engine.as_str()));
            row.insert("OS".to_string(), DataValue::from(total.os.clone()));
            row.insert("Error".to_string(), DataValue::from(error));
            row.insert("ReportDate".to_string(), DataValue::from(report_date.as_str()));
            row
        })
        .collect()
}

/// Origem dos totais diários de backup
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn backup_totals(
        &self,
        date: NaiveDate,
        engine: &str,
        location: &str,
    ) -> Result<Vec<ServerBackupTotal>>;
}

/// Gera o relatório do dia e o acrescenta ao warehouse
///
/// Retorna `None` quando nenhum servidor teve backup registrado na data.
pub async fn run_daily_report(
    source: &dyn ReportSource,
    loader: &dyn Loader,
    date: NaiveDate,
) -> Result<Option<LoadResult>> {
    let mut totals = Vec::new();
    for engine in REPORT_ENGINES {
        let found = source.backup_totals(date, engine, REPORT_LOCATION).await?;
        tracing::info!(engine, servers = found.len(), date = %date, "Totais de backup consultados");
        totals.extend(found);
    }

    let rows = build_report(&totals, date);
    if rows.is_empty() {
        tracing::warn!(date = %date, "Nenhum backup registrado na data, relatório não gerado");
        return Ok(None);
    }

    let errors = rows
        .iter()
        .filter(|r| r.get("Error") == Some(&DataValue::from("Yes")))
        .count();
    if errors > 0 {
        tracing::warn!(date = %date, servers = errors, "Servidores sem volume de backup no dia");
    }

    let spec = report_table_spec()?;
    let result = loader.load(rows, &spec, WriteMode::Append).await?;
    Ok(Some(result))
}
