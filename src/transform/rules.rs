use async_trait::async_trait;
use std::sync::Arc;
use crate::error::Result;
use crate::schema::{SchemaRegistry, TransformRules};
use crate::traits::{TransformReport, Transformer};
use crate::types::{is_plausible_year, DataRow, DataValue, Relation};

/// Transformador guiado pelas regras declaradas no registro de schemas
///
/// Aplica, nesta ordem: renomeação, remoção de colunas, coerção booleana e
/// reparo de timestamps. Cada linha é tratada de forma independente e a ordem
/// da relação é preservada.
#[derive(Debug, Clone)]
pub struct RuleTransformer {
    registry: Arc<SchemaRegistry>,
}

impl RuleTransformer {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }
}

/// Converte uma representação qualquer em booleano genuíno
///
/// Nulo e grafias falsas viram `false`; qualquer outro valor não nulo vira `true`.
pub fn coerce_boolean(value: &DataValue) -> bool {
    match value {
        DataValue::Null => false,
        other => other.as_boolean().unwrap_or(true),
    }
}

/// Converte em timestamp canônico, ou `None` se ilegível ou anterior a 1900
fn repair_timestamp(value: &DataValue) -> Option<DataValue> {
    value
        .as_datetime()
        .filter(is_plausible_year)
        .map(DataValue::DateTime)
}

fn apply_rules(mut row: DataRow, rules: &TransformRules, nulled: &mut [usize]) -> DataRow {
    for (from, to) in &rules.rename {
        if let Some(value) = row.remove(from) {
            row.insert(to.clone(), value);
        }
    }

    for column in &rules.drop {
        row.remove(column);
    }

    for column in &rules.boolean_columns {
        if let Some(value) = row.get_mut(column) {
            *value = DataValue::Boolean(coerce_boolean(value));
        }
    }

    for (idx, column) in rules.timestamp_columns.iter().enumerate() {
        if let Some(value) = row.get_mut(column) {
            if value.is_null() {
                continue;
            }
            match repair_timestamp(value) {
                Some(repaired) => *value = repaired,
                None => {
                    *value = DataValue::Null;
                    nulled[idx] += 1;
                }
            }
        }
    }

    row
}

#[async_trait]
impl Transformer for RuleTransformer {
    async fn transform_with_report(
        &self,
        data: Relation,
        table_name: &str,
    ) -> Result<(Relation, TransformReport)> {
        let rules = &self.registry.get_schema(table_name)?.rules;
        let mut nulled = vec![0usize; rules.timestamp_columns.len()];

        let rows: Relation = data
            .into_iter()
            .map(|row| apply_rules(row, rules, &mut nulled))
            .collect();

        let report = TransformReport {
            nulled_timestamps: rules
                .timestamp_columns
                .iter()
                .zip(nulled)
                .filter(|(_, count)| *count > 0)
                .map(|(column, count)| (column.clone(), count))
                .collect(),
        };

        tracing::debug!(
            table = table_name,
            rows = rows.len(),
            nulled = report.total_nulled(),
            "Transformação concluída"
        );
        Ok((rows, report))
    }
}
