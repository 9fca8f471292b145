use crate::{
    config::SnowflakeConfig,
    error::WarehouseError,
    kind::{AuthType, WarehouseKind, WarehouseRole},
    normalizer::ValueNormalizer,
    snowflake::{
        client::{QueryData, RowType, SnowflakeRestClient},
        sql,
    },
    warehouse::{RowBatchStream, Warehouse},
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Days, NaiveDate};
use futures_util::{StreamExt, stream};
use model::{
    core::{column::ColumnSpec, column::TableSchema, etl::EtlId, policy::CdcPolicy, table::TableSpec},
    records::{batch::BatchColumn, batch::RowBatch, row::Row, value::Value},
};
use std::str::FromStr;
use tracing::{debug, info};

/// Stream-capable source backend. Change extraction runs over per-table
/// stream objects and a staging table in the configured change-tracking
/// schema; see the `sql` module for the statement shapes.
pub struct SnowflakeWarehouse {
    config: SnowflakeConfig,
    role: WarehouseRole,
    client: Option<SnowflakeRestClient>,
}

impl SnowflakeWarehouse {
    pub fn new(config: SnowflakeConfig, role: WarehouseRole) -> Self {
        SnowflakeWarehouse {
            config,
            role,
            client: None,
        }
    }

    fn client(&self) -> Result<&SnowflakeRestClient, WarehouseError> {
        self.client
            .as_ref()
            .ok_or_else(|| WarehouseError::not_connected("snowflake"))
    }

    fn stream_name(&self, table: &TableSpec) -> String {
        sql::stream_name(&self.config.change_tracking_schema_fqn(), table)
    }

    fn processing_table_name(&self, table: &TableSpec) -> String {
        sql::processing_table_name(&self.config.change_tracking_schema_fqn(), table)
    }

    async fn fetch_schema(&self, table: &TableSpec) -> Result<TableSchema, WarehouseError> {
        let data = self.client()?.execute(&sql::describe_table(table)).await?;
        let mut schema = TableSchema::default();
        for row in &data.rowset {
            let field = |idx: usize| row.get(idx).cloned().flatten();
            let name = field(0).ok_or_else(|| {
                WarehouseError::DataPlane(format!(
                    "DESC TABLE returned a column without a name for {}",
                    table.qualified_name()
                ))
            })?;
            let logical_type = field(1).unwrap_or_else(|| "VARCHAR".to_string());
            schema.push(ColumnSpec::new(
                name,
                logical_type,
                field(3).as_deref() == Some("Y"),
                field(4),
                field(5).as_deref() == Some("Y"),
            ));
        }
        Ok(schema)
    }

    /// Splits a decoded result set into row batches, re-labelling columns
    /// with the base table's declared types where the names match so the
    /// normalizer sees source logical types rather than protocol ones.
    fn batches_from(&self, data: QueryData, schema: Option<&TableSchema>) -> Vec<RowBatch> {
        let columns: Vec<BatchColumn> = data
            .rowtype
            .iter()
            .map(|rt| {
                let declared = schema.and_then(|s| {
                    s.columns()
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(&rt.name))
                        .map(|c| c.logical_type.clone())
                });
                BatchColumn::new(
                    &rt.name,
                    declared.unwrap_or_else(|| rt.column_type.to_uppercase()),
                )
            })
            .collect();

        let rowtype = data.rowtype;
        data.rowset
            .chunks(self.config.batch_size.max(1))
            .map(|chunk| {
                let rows = chunk
                    .iter()
                    .map(|raw| {
                        Row::new(
                            raw.iter()
                                .enumerate()
                                .map(|(idx, value)| decode_value(value.clone(), rowtype.get(idx)))
                                .collect(),
                        )
                    })
                    .collect();
                RowBatch::new(columns.clone(), rows)
            })
            .collect()
    }

    fn into_stream(batches: Vec<RowBatch>) -> RowBatchStream {
        stream::iter(batches.into_iter().map(Ok::<_, WarehouseError>)).boxed()
    }

    fn validate_setup(&self, tables: &[TableSpec], schemas: &[TableSchema]) -> Vec<String> {
        let mut problems = Vec::new();
        for (table, schema) in tables.iter().zip(schemas) {
            let policy = table.cdc_policy();
            if !self.supported_cdc_policies().contains(&policy) {
                problems.push(format!(
                    "Invalid cdc_type \"{policy}\" selected for {}. \"{policy}\" is not \
                     supported by snowflake sources.",
                    table.qualified_name()
                ));
                continue;
            }
            if policy == CdcPolicy::StandardStream && schema.has_spatial_column() {
                problems.push(format!(
                    "Table {} has a geometry or geography column and cannot use \
                     STANDARD_STREAM. Consider APPEND_ONLY_STREAM or FULL_REFRESH instead.",
                    table.qualified_name()
                ));
            }
        }
        problems
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    fn kind(&self) -> WarehouseKind {
        WarehouseKind::Snowflake
    }

    fn role(&self) -> WarehouseRole {
        self.role
    }

    fn auth_type(&self) -> AuthType {
        AuthType::UsernameAndPassword
    }

    fn supported_cdc_policies(&self) -> &'static [CdcPolicy] {
        &CdcPolicy::ALL
    }

    fn full_table_name(&self, table: &TableSpec) -> String {
        sql::full_table_name(table)
    }

    fn change_tracking_schema_fqn(&self) -> String {
        self.config.change_tracking_schema_fqn()
    }

    async fn connect(&mut self) -> Result<(), WarehouseError> {
        if self.client.as_ref().is_some_and(|c| c.is_connected()) {
            return Ok(());
        }
        let mut client = SnowflakeRestClient::new(&self.config.account);
        client
            .login(&self.config.account, &self.config.user, &self.config.password)
            .await?;
        // Pin the session context; every later statement runs under them.
        client
            .execute(&format!("USE ROLE {};", self.config.role))
            .await?;
        client
            .execute(&format!("USE WAREHOUSE {};", self.config.warehouse))
            .await?;
        info!(account = %self.config.account, "connected to snowflake");
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), WarehouseError> {
        if let Some(mut client) = self.client.take() {
            client.close_session();
            debug!("disconnected from snowflake");
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), WarehouseError> {
        self.client()?.execute("BEGIN;").await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        self.client()?.execute("COMMIT;").await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), WarehouseError> {
        self.client()?.execute("ROLLBACK;").await.map(|_| ())
    }

    async fn get_schema(&mut self, table: &TableSpec) -> Result<TableSchema, WarehouseError> {
        self.fetch_schema(table).await
    }

    async fn get_primary_keys(&mut self, table: &TableSpec) -> Result<Vec<String>, WarehouseError> {
        Ok(self.fetch_schema(table).await?.primary_keys())
    }

    async fn setup_environment(&mut self, tables: &[TableSpec]) -> Result<(), WarehouseError> {
        if self.role != WarehouseRole::Source {
            return Err(WarehouseError::NotSupported(
                "snowflake is not supported as a target environment".into(),
            ));
        }

        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            schemas.push(self.fetch_schema(table).await?);
        }
        let problems = self.validate_setup(tables, &schemas);
        if !problems.is_empty() {
            return Err(WarehouseError::NotSupported(problems.join("\n")));
        }

        let cts = self.config.change_tracking_schema_fqn();
        let replace = self.config.replace_existing;
        for table in tables {
            let policy = table.cdc_policy();
            if !policy.is_stream() {
                continue;
            }
            info!(
                table = %table.qualified_name(),
                policy = policy.as_str(),
                "creating source CDC objects"
            );
            let append_only = policy == CdcPolicy::AppendOnlyStream;
            self.client()?
                .execute(&sql::create_stream(&cts, table, append_only, replace))
                .await?;
            self.client()?
                .execute(&sql::create_processing_table(&cts, table, replace))
                .await?;
            for statement in sql::add_metadata_columns(&cts, table) {
                self.client()?.execute(&statement).await?;
            }
        }
        Ok(())
    }

    async fn create_table(
        &mut self,
        table: &TableSpec,
        _source_schema: &TableSchema,
        _target_schema: &TableSchema,
    ) -> Result<(), WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "snowflake cannot create replicated tables; {} belongs on the target",
            table.qualified_name()
        )))
    }

    async fn get_batches_for_full_refresh(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError> {
        let schema = self.fetch_schema(table).await?;
        let data = self.client()?.execute(&sql::select_full_table(table)).await?;
        Ok(Self::into_stream(self.batches_from(data, Some(&schema))))
    }

    async fn get_delete_batches_for_stream(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError> {
        let primary_keys = self.get_primary_keys(table).await?;
        let staging = self.processing_table_name(table);
        let data = self
            .client()?
            .execute(&sql::select_streamed_deletes(&staging, &primary_keys))
            .await?;
        Ok(Self::into_stream(self.batches_from(data, None)))
    }

    async fn get_insert_batches_for_stream(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError> {
        let schema = self.fetch_schema(table).await?;
        let staging = self.processing_table_name(table);
        let data = self
            .client()?
            .execute(&sql::select_streamed_inserts(&staging, &schema.column_names()))
            .await?;
        Ok(Self::into_stream(self.batches_from(data, Some(&schema))))
    }

    async fn process_insert_batches(
        &mut self,
        table: &TableSpec,
        _batches: RowBatchStream,
        _normalizer: &ValueNormalizer,
    ) -> Result<(), WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "snowflake cannot apply batches; {} belongs on the target",
            table.qualified_name()
        )))
    }

    async fn process_delete_batches(
        &mut self,
        table: &TableSpec,
        _batches: RowBatchStream,
        _normalizer: &ValueNormalizer,
    ) -> Result<(), WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "snowflake cannot apply batches; {} belongs on the target",
            table.qualified_name()
        )))
    }

    async fn truncate_table(&mut self, table: &TableSpec) -> Result<(), WarehouseError> {
        self.client()?
            .execute(&sql::truncate(&sql::full_table_name(table)))
            .await
            .map(|_| ())
    }

    async fn prepare_stream_ingestion(
        &mut self,
        table: &TableSpec,
        new_etl_id: &EtlId,
        completed_etl_ids: &[EtlId],
    ) -> Result<(), WarehouseError> {
        let staging = self.processing_table_name(table);
        let stream = self.stream_name(table);

        if !completed_etl_ids.is_empty() {
            debug!(
                table = %table.qualified_name(),
                count = completed_etl_ids.len(),
                "purging staging rows already applied on the target"
            );
            self.client()?
                .execute(&sql::purge_completed_rows(&staging, completed_etl_ids))
                .await?;
        }
        self.client()?
            .execute(&sql::drain_stream(&staging, &stream, new_etl_id))
            .await?;
        self.client()?
            .execute(&sql::tag_untagged_rows(&staging, new_etl_id))
            .await?;
        Ok(())
    }

    async fn cleanup_source(&mut self, table: &TableSpec) -> Result<(), WarehouseError> {
        let staging = self.processing_table_name(table);
        match self.client()?.execute(&sql::truncate(&staging)).await {
            Ok(_) => Ok(()),
            Err(WarehouseError::MissingObject(_)) => Err(WarehouseError::MissingObject(format!(
                "Stream processing table {staging} not found for {}. Please run \
                 `melchi setup` to recreate the CDC objects before syncing again.",
                table.qualified_name()
            ))),
            Err(other) => Err(other),
        }
    }

    async fn update_cdc_trackers(
        &mut self,
        table: &TableSpec,
        _etl_id: &EtlId,
    ) -> Result<(), WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "snowflake keeps no cdc trackers; {} belongs on the target",
            table.qualified_name()
        )))
    }

    async fn get_etl_ids(&mut self, table: &TableSpec) -> Result<Vec<EtlId>, WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "snowflake keeps no etl events; {} belongs on the target",
            table.qualified_name()
        )))
    }

    async fn execute_query(
        &mut self,
        sql_text: &str,
        return_rows: bool,
    ) -> Result<Option<RowBatch>, WarehouseError> {
        let data = self.client()?.execute(sql_text).await?;
        if !return_rows {
            return Ok(None);
        }
        let mut batches = self.batches_from(data, None);
        Ok(Some(match batches.len() {
            0 => RowBatch::new(Vec::new(), Vec::new()),
            1 => batches.remove(0),
            _ => {
                let mut merged = batches.remove(0);
                for batch in batches {
                    merged.rows.extend(batch.rows);
                }
                merged
            }
        }))
    }
}

/// Decodes one wire value using the protocol row type. The session protocol
/// encodes everything as strings: numbers verbatim, dates as days since the
/// epoch, timestamps as epoch seconds with a fractional part.
fn decode_value(raw: Option<String>, row_type: Option<&RowType>) -> Value {
    let Some(text) = raw else {
        return Value::Null;
    };
    let Some(row_type) = row_type else {
        return Value::Str(text);
    };

    match row_type.column_type.to_lowercase().as_str() {
        "fixed" => {
            if row_type.scale.unwrap_or(0) == 0 {
                text.parse::<i64>().map(Value::Int).unwrap_or_else(|_| {
                    BigDecimal::from_str(&text)
                        .map(Value::Decimal)
                        .unwrap_or(Value::Str(text))
                })
            } else {
                BigDecimal::from_str(&text)
                    .map(Value::Decimal)
                    .unwrap_or(Value::Str(text))
            }
        }
        "real" => text.parse::<f64>().map(Value::Float).unwrap_or(Value::Str(text)),
        "boolean" => Value::Bool(text == "1" || text.eq_ignore_ascii_case("true")),
        "date" => decode_epoch_days(&text).map(Value::Date).unwrap_or(Value::Str(text)),
        "timestamp_ntz" => decode_epoch_seconds(&text)
            .map(|ts| Value::Timestamp(ts.naive_utc()))
            .unwrap_or(Value::Str(text)),
        "timestamp_tz" | "timestamp_ltz" => decode_epoch_seconds(&text)
            .map(Value::TimestampTz)
            .unwrap_or(Value::Str(text)),
        _ => Value::Str(text),
    }
}

fn decode_epoch_days(text: &str) -> Option<NaiveDate> {
    let days: i64 = text.trim().parse().ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if days >= 0 {
        epoch.checked_add_days(Days::new(days as u64))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

// Timestamp_tz values carry a trailing timezone index after a space; the
// leading token is always epoch seconds with an optional fraction.
fn decode_epoch_seconds(text: &str) -> Option<DateTime<chrono::Utc>> {
    let token = text.split_whitespace().next()?;
    let (seconds, fraction) = match token.split_once('.') {
        Some((s, f)) => (s, f),
        None => (token, ""),
    };
    let secs: i64 = seconds.parse().ok()?;
    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<9}");
        padded[..9].parse().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnowflakeConfig;

    fn warehouse() -> SnowflakeWarehouse {
        SnowflakeWarehouse::new(
            SnowflakeConfig {
                account: "acme-test".to_string(),
                user: "melchi".to_string(),
                password: "secret".to_string(),
                role: "test_role".to_string(),
                warehouse: "test_warehouse".to_string(),
                change_tracking_database: "melchi_db".to_string(),
                change_tracking_schema: "melchi_cdc".to_string(),
                replace_existing: false,
                batch_size: 10_000,
            },
            WarehouseRole::Source,
        )
    }

    fn spec(table: &str, policy: CdcPolicy) -> TableSpec {
        TableSpec::new("sales_db", "public", table, policy).unwrap()
    }

    #[test]
    fn standard_stream_over_geometry_is_rejected_with_alternatives() {
        let wh = warehouse();
        let tables = vec![spec("locations", CdcPolicy::StandardStream)];
        let schemas = vec![TableSchema::new(vec![ColumnSpec::new(
            "location",
            "GEOMETRY",
            true,
            None,
            false,
        )])];

        let problems = wh.validate_setup(&tables, &schemas);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("sales_db.public.locations"));
        assert!(problems[0].contains("geometry or geography"));
        assert!(problems[0].contains("APPEND_ONLY_STREAM"));
        assert!(problems[0].contains("FULL_REFRESH"));
    }

    #[test]
    fn geometry_is_fine_under_the_other_policies() {
        let wh = warehouse();
        let schema = TableSchema::new(vec![ColumnSpec::new(
            "region",
            "GEOGRAPHY",
            true,
            None,
            false,
        )]);
        let tables = vec![
            spec("a", CdcPolicy::AppendOnlyStream),
            spec("b", CdcPolicy::FullRefresh),
        ];
        let schemas = vec![schema.clone(), schema];
        assert!(wh.validate_setup(&tables, &schemas).is_empty());
    }

    #[test]
    fn validation_collects_every_problem_in_the_batch() {
        let wh = warehouse();
        let spatial = TableSchema::new(vec![ColumnSpec::new(
            "location",
            "GEOMETRY",
            true,
            None,
            false,
        )]);
        let tables = vec![
            spec("first", CdcPolicy::StandardStream),
            spec("second", CdcPolicy::StandardStream),
        ];
        let schemas = vec![spatial.clone(), spatial];
        let problems = wh.validate_setup(&tables, &schemas);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("first"));
        assert!(problems[1].contains("second"));
    }

    fn row_type(column_type: &str, scale: Option<i64>) -> RowType {
        RowType {
            name: "c".to_string(),
            column_type: column_type.to_string(),
            scale,
        }
    }

    #[test]
    fn decodes_fixed_values_by_scale() {
        assert_eq!(
            decode_value(Some("42".into()), Some(&row_type("fixed", Some(0)))),
            Value::Int(42)
        );
        assert_eq!(
            decode_value(Some("1.25".into()), Some(&row_type("fixed", Some(2)))),
            Value::Decimal(BigDecimal::from_str("1.25").unwrap())
        );
    }

    #[test]
    fn decodes_dates_from_epoch_days() {
        assert_eq!(
            decode_value(Some("19723".into()), Some(&row_type("date", None))),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn decodes_timestamps_from_epoch_seconds() {
        let decoded = decode_value(
            Some("1704067200.500000000".into()),
            Some(&row_type("timestamp_tz", Some(9))),
        );
        match decoded {
            Value::TimestampTz(ts) => {
                assert_eq!(ts.timestamp(), 1_704_067_200);
                assert_eq!(ts.timestamp_subsec_millis(), 500);
            }
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn null_and_unknown_types_fall_back() {
        assert_eq!(decode_value(None, Some(&row_type("text", None))), Value::Null);
        assert_eq!(
            decode_value(Some("abc".into()), Some(&row_type("text", None))),
            Value::Str("abc".into())
        );
    }
}
