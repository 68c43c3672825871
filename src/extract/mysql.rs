//! # MySQL Extractor
//!
//! Extrator do inventário de backups no MySQL. Cada chamada abre a própria conexão
//! e a fecha ao final, inclusive nos caminhos de erro; nenhuma conexão é mantida
//! entre tabelas.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use std::time::Duration;
use crate::config::{Credentials, SourceConfig};
use crate::error::{ETLError, ExtractError, Result};
use crate::extract::{build_query, normalize_temporal, RunWindow};
use crate::report::{ReportSource, ServerBackupTotal};
use crate::schema::TableSpec;
use crate::traits::Extractor;
use crate::types::{DataRow, DataValue, Relation};

/// Extrator para o banco MySQL de inventário
#[derive(Debug, Clone)]
pub struct MySqlExtractor {
    options: MySqlConnectOptions,
    database: String,
    connect_timeout: Duration,
}

impl MySqlExtractor {
    /// Cria o extrator a partir da configuração da origem e das credenciais
    pub fn new(config: &SourceConfig, credentials: &Credentials) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&credentials.user)
            .password(&credentials.password)
            .database(&config.database)
            .disable_statement_logging();

        Self {
            options,
            database: config.database.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_seconds.max(1)),
        }
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ETLError::Extract(ExtractError::SourceUnavailable(format!(
                "{}: {}",
                self.database, e
            )))),
            Err(_) => Err(ETLError::Extract(ExtractError::SourceUnavailable(format!(
                "{}: conexão excedeu {}s",
                self.database,
                self.connect_timeout.as_secs()
            )))),
        }
    }

    /// Fecha a conexão sem mascarar o resultado da operação
    async fn release(conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Falha ao fechar conexão com a origem");
        }
    }

    async fn fetch_rows(conn: &mut MySqlConnection, table: &str, query: &str) -> Result<Relation> {
        let rows = sqlx::query(query)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| query_error(table, e))?;

        rows.iter()
            .map(|row| decode_row(table, row))
            .collect()
    }
}

fn query_error(table: &str, err: sqlx::Error) -> ETLError {
    match err {
        sqlx::Error::Database(db_err) => ETLError::Extract(ExtractError::Query {
            table: table.to_string(),
            message: db_err.to_string(),
        }),
        other => ETLError::from(other),
    }
}

/// Decodifica uma linha conforme o tipo declarado de cada coluna
fn decode_row(table: &str, row: &MySqlRow) -> Result<DataRow> {
    let mut data = DataRow::with_capacity(row.columns().len());

    for column in row.columns() {
        let idx = column.ordinal();
        let is_null = row
            .try_get_raw(idx)
            .map(|raw| raw.is_null())
            .map_err(|e| query_error(table, e))?;

        let value = if is_null {
            DataValue::Null
        } else {
            decode_value(row, idx, column.type_info().name()).map_err(|e| {
                ETLError::Extract(ExtractError::Query {
                    table: table.to_string(),
                    message: format!("coluna {}: {}", column.name(), e),
                })
            })?
        };

        data.insert(column.name().to_string(), value);
    }

    Ok(data)
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> std::result::Result<DataValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => DataValue::Boolean(row.try_get::<bool, _>(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            DataValue::Integer(row.try_get_unchecked::<i64, _>(idx)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let v = row.try_get_unchecked::<u64, _>(idx)?;
            i64::try_from(v)
                .map(DataValue::Integer)
                .unwrap_or_else(|_| DataValue::String(v.to_string()))
        }
        "FLOAT" => DataValue::Float(row.try_get::<f32, _>(idx)? as f64),
        "DOUBLE" => DataValue::Float(row.try_get::<f64, _>(idx)?),
        "DECIMAL" => {
            let raw = row.try_get_unchecked::<String, _>(idx)?;
            raw.parse::<f64>()
                .map(DataValue::Float)
                .unwrap_or(DataValue::String(raw))
        }
        // datas zeradas ou fora de faixa viram nulo, a transformação trata o resto
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(DataValue::Date)
            .unwrap_or(DataValue::Null),
        "DATETIME" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(DataValue::DateTime)
            .unwrap_or(DataValue::Null),
        "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(DataValue::Timestamp)
            .unwrap_or(DataValue::Null),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .map(|t| DataValue::String(t.format("%H:%M:%S").to_string()))
            .unwrap_or(DataValue::Null),
        "BIT" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
            DataValue::Integer(bytes.iter().fold(0i64, |acc, b| (acc << 8) | *b as i64))
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
            DataValue::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => DataValue::String(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

#[async_trait]
impl Extractor for MySqlExtractor {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;

        let result = sqlx::query_scalar::<_, String>(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
        )
        .bind(&self.database)
        .fetch_all(&mut conn)
        .await
        .map_err(|e| query_error("information_schema.TABLES", e));

        Self::release(conn).await;
        result
    }

    async fn extract(&self, table: &TableSpec, window: &RunWindow) -> Result<Relation> {
        let query = build_query(table, window)?;
        tracing::debug!(table = %table.logical_name, query = %query, "Consulta de extração");

        let mut conn = self.connect().await?;
        let result = Self::fetch_rows(&mut conn, &table.logical_name, &query).await;
        Self::release(conn).await;

        let mut rows = result?;
        normalize_temporal(&mut rows);

        tracing::info!(
            table = %table.logical_name,
            rows = rows.len(),
            mode = %window.mode,
            "Extraídas {} linhas da tabela MySQL {}",
            rows.len(),
            table.logical_name
        );
        Ok(rows)
    }
}

const BACKUP_TOTALS_QUERY: &str = "\
SELECT CAST(b.server AS CHAR), CAST(s.location AS CHAR), CAST(s.type AS CHAR), \
CAST(s.os AS CHAR), CAST(SUM(b.size) AS CHAR) \
FROM daily_log b JOIN servers s ON s.name = b.server \
WHERE DATE(b.backup_date) = ? AND s.location = ? AND s.type = ? \
GROUP BY b.server, s.location, s.type, s.os";

type BackupTotalRow = (String, String, String, Option<String>, Option<String>);

#[async_trait]
impl ReportSource for MySqlExtractor {
    async fn backup_totals(
        &self,
        date: NaiveDate,
        engine: &str,
        location: &str,
    ) -> Result<Vec<ServerBackupTotal>> {
        let mut conn = self.connect().await?;

        let result = sqlx::query_as::<_, BackupTotalRow>(BACKUP_TOTALS_QUERY)
            .bind(date)
            .bind(location)
            .bind(engine)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| query_error("daily_log", e));

        Self::release(conn).await;

        Ok(result?
            .into_iter()
            .map(|(server, location, engine, os, total)| ServerBackupTotal {
                server,
                location,
                engine,
                os,
                total_bytes: total.and_then(|t| t.parse().ok()).unwrap_or(0.0),
            })
            .collect())
    }
}
