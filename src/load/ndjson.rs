//! # NDJSON
//!
//! Serialização da relação no formato newline-delimited JSON aceito pelos jobs
//! de carga: um objeto por linha, chaves iguais aos campos de destino.

use std::collections::BTreeSet;
use crate::error::{ETLError, LoadError, Result};
use crate::schema::TableSpec;
use crate::types::{DataRow, Relation};

/// Colunas da relação que não existem no schema de destino
pub fn undeclared_columns(rows: &Relation, table: &TableSpec) -> Vec<String> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys())
        .map(String::as_str)
        .filter(|column| table.field(column).is_none())
        .collect();
    columns.into_iter().map(str::to_string).collect()
}

/// Falha com `SchemaMismatch` se alguma coluna não estiver declarada
pub fn check_columns(rows: &Relation, table: &TableSpec) -> Result<()> {
    let columns = undeclared_columns(rows, table);
    if columns.is_empty() {
        return Ok(());
    }
    Err(ETLError::Load(LoadError::SchemaMismatch {
        table: table.logical_name.clone(),
        columns,
    }))
}

/// Converte uma linha em objeto JSON; campos declarados ausentes viram `null`
pub fn row_to_json(row: &DataRow, table: &TableSpec) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = table
        .destination_fields
        .iter()
        .map(|field| {
            let value = row
                .get(&field.name)
                .map(|v| v.to_json())
                .unwrap_or(serde_json::Value::Null);
            (field.name.clone(), value)
        })
        .collect();
    serde_json::Value::Object(map)
}

/// Serializa a relação, uma linha por registro
pub fn encode(rows: &Relation, table: &TableSpec) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(rows.len() * 128);
    for row in rows {
        serde_json::to_writer(&mut buffer, &row_to_json(row, table))?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

/// Lê registros NDJSON, ignorando linhas em branco
pub fn decode(records: &[u8]) -> Result<Vec<serde_json::Value>> {
    let text = String::from_utf8_lossy(records);
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ETLError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use crate::types::DataValue;
    use chrono::NaiveDate;

    fn spec() -> TableSpec {
        TableSpec::new(
            "backup_log",
            vec![
                FieldSpec::new("id", FieldType::Integer),
                FieldSpec::new("server", FieldType::String),
                FieldSpec::new("backup_date", FieldType::Timestamp),
                FieldSpec::new("ok", FieldType::Boolean),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_encode_one_record_per_line() {
        let mut row = DataRow::new();
        row.insert("id".to_string(), DataValue::Integer(7));
        row.insert("server".to_string(), DataValue::from("db01"));
        row.insert(
            "backup_date".to_string(),
            DataValue::DateTime(
                NaiveDate::from_ymd_opt(2025, 3, 14)
                    .unwrap()
                    .and_hms_opt(2, 30, 0)
                    .unwrap(),
            ),
        );
        let rows = vec![row.clone(), row];

        let bytes = encode(&rows, &spec()).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));

        let records = decode(&bytes).unwrap();
        assert_eq!(records[0]["id"], 7);
        assert_eq!(records[0]["backup_date"], "2025-03-14 02:30:00");
        assert!(records[0]["ok"].is_null());
    }

    #[test]
    fn test_undeclared_columns_are_a_mismatch() {
        let mut row = DataRow::new();
        row.insert("id".to_string(), DataValue::Integer(1));
        row.insert("fileName".to_string(), DataValue::from("x.sql"));
        row.insert("Extra".to_string(), DataValue::Null);

        let err = check_columns(&vec![row], &spec()).unwrap_err();
        match err {
            ETLError::Load(LoadError::SchemaMismatch { table, columns }) => {
                assert_eq!(table, "backup_log");
                assert_eq!(columns, vec!["Extra".to_string(), "fileName".to_string()]);
            }
            other => panic!("erro inesperado: {:?}", other),
        }
    }

    #[test]
    fn test_empty_relation_encodes_to_nothing() {
        assert!(encode(&vec![], &spec()).unwrap().is_empty());
        assert!(check_columns(&vec![], &spec()).is_ok());
    }
}
