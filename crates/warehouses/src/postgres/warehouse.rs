use crate::{
    config::PostgresConfig,
    error::WarehouseError,
    kind::{AuthType, WarehouseKind, WarehouseRole},
    normalizer::ValueNormalizer,
    postgres::sql,
    warehouse::{RowBatchStream, Warehouse},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use model::{
    core::{
        column::{ColumnSpec, TableSchema},
        etl::EtlId,
        policy::CdcPolicy,
        table::{GENERATED_KEY_COLUMN, TableSpec},
    },
    records::{batch::BatchColumn, batch::RowBatch, row::Row, value::Value},
};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, types::Type};
use tracing::{debug, error, info};

/// Storage backend. Applies deletes and inserts inside the caller's open
/// transaction and keeps the change-tracking metadata tables current.
pub struct PostgresWarehouse {
    config: PostgresConfig,
    role: WarehouseRole,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
}

impl PostgresWarehouse {
    pub fn new(config: PostgresConfig, role: WarehouseRole) -> Self {
        PostgresWarehouse {
            config,
            role,
            client: None,
            connection_task: None,
        }
    }

    fn client(&self) -> Result<&Client, WarehouseError> {
        self.client
            .as_ref()
            .ok_or_else(|| WarehouseError::not_connected("postgres"))
    }

    fn cts(&self) -> &str {
        &self.config.change_tracking_schema
    }

    async fn table_exists(&self, table: &TableSpec) -> Result<bool, WarehouseError> {
        let row = self
            .client()?
            .query_one(sql::TABLE_EXISTS, &[&table.schema(), &table.table()])
            .await?;
        Ok(row.get(0))
    }

    /// Declared column order of the replicated table; the insert column
    /// list follows it.
    async fn target_column_names(&self, table: &TableSpec) -> Result<Vec<String>, WarehouseError> {
        let rows = self
            .client()?
            .query(sql::SELECT_COLUMNS, &[&table.schema(), &table.table()])
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn fetch_primary_keys(&self, table: &TableSpec) -> Result<Vec<String>, WarehouseError> {
        let rows = self
            .client()?
            .query(
                &sql::select_primary_keys(self.cts()),
                &[&table.schema(), &table.table()],
            )
            .await?;
        let mut keys: Vec<String> = match rows.first() {
            Some(row) => row.get(0),
            None => Vec::new(),
        };
        keys.sort();
        Ok(keys)
    }

    async fn batch_execute(&self, statement: &str) -> Result<(), WarehouseError> {
        debug!(statement, "executing postgres statement");
        self.client()?.batch_execute(statement).await?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    fn kind(&self) -> WarehouseKind {
        WarehouseKind::Postgres
    }

    fn role(&self) -> WarehouseRole {
        self.role
    }

    fn auth_type(&self) -> AuthType {
        AuthType::UsernameAndPassword
    }

    fn supported_cdc_policies(&self) -> &'static [CdcPolicy] {
        // Not a stream-capable source.
        &[]
    }

    fn full_table_name(&self, table: &TableSpec) -> String {
        sql::full_table_name(table)
    }

    fn change_tracking_schema_fqn(&self) -> String {
        self.config.change_tracking_schema.clone()
    }

    async fn connect(&mut self) -> Result<(), WarehouseError> {
        if self.client.is_some() {
            return Ok(());
        }
        let (client, connection) =
            tokio_postgres::connect(&self.config.connection_string(), NoTls)
                .await
                .map_err(|e| {
                    WarehouseError::Connection(format!(
                        "failed to connect to postgres at {}: {e}",
                        self.config.host
                    ))
                })?;
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {e}");
            }
        });
        info!(host = %self.config.host, database = %self.config.database, "connected to postgres");
        self.client = Some(client);
        self.connection_task = Some(task);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), WarehouseError> {
        if self.client.take().is_some() {
            debug!("disconnected from postgres");
        }
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), WarehouseError> {
        self.batch_execute("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        self.batch_execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), WarehouseError> {
        self.batch_execute("ROLLBACK").await
    }

    async fn get_schema(&mut self, table: &TableSpec) -> Result<TableSchema, WarehouseError> {
        let keys = self.fetch_primary_keys(table).await?;
        let rows = self
            .client()?
            .query(sql::SELECT_COLUMNS, &[&table.schema(), &table.table()])
            .await?;
        let mut schema = TableSchema::default();
        for row in rows {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let nullable: String = row.get(2);
            let default: Option<String> = row.get(3);
            let is_key = keys.iter().any(|k| k.eq_ignore_ascii_case(&name));
            schema.push(ColumnSpec::new(
                name,
                data_type,
                nullable.eq_ignore_ascii_case("YES"),
                default,
                is_key,
            ));
        }
        Ok(schema)
    }

    async fn get_primary_keys(&mut self, table: &TableSpec) -> Result<Vec<String>, WarehouseError> {
        self.fetch_primary_keys(table).await
    }

    async fn setup_environment(&mut self, _tables: &[TableSpec]) -> Result<(), WarehouseError> {
        if self.role != WarehouseRole::Target {
            return Err(WarehouseError::NotSupported(
                "postgres is not supported as a source environment".into(),
            ));
        }
        info!(schema = self.cts(), "creating change-tracking metadata tables");
        self.batch_execute(&sql::create_change_tracking_schema(self.cts()))
            .await?;
        for statement in sql::create_metadata_tables(self.cts(), self.config.replace_existing) {
            self.batch_execute(&statement).await?;
        }
        Ok(())
    }

    async fn create_table(
        &mut self,
        table: &TableSpec,
        source_schema: &TableSchema,
        target_schema: &TableSchema,
    ) -> Result<(), WarehouseError> {
        if !self.config.replace_existing && self.table_exists(table).await? {
            debug!(table = %table.qualified_name(), "table already exists, skipping create");
            return Ok(());
        }

        self.batch_execute(&sql::create_schema(table)).await?;

        let mut effective = target_schema.clone();
        let mut primary_keys = effective.primary_keys();
        if table.needs_generated_key(target_schema) {
            effective.push(ColumnSpec::new(
                GENERATED_KEY_COLUMN,
                "VARCHAR",
                false,
                None,
                true,
            ));
            primary_keys.push(GENERATED_KEY_COLUMN.to_string());
        }

        if effective
            .columns()
            .iter()
            .any(|c| c.logical_type.to_uppercase().contains("GEOMETRY"))
        {
            self.batch_execute(&sql::install_spatial_support()).await?;
        }

        if self.config.replace_existing {
            self.batch_execute(&sql::drop_table(table)).await?;
        }
        self.batch_execute(&sql::create_table_statement(
            table,
            &effective,
            self.config.replace_existing,
        ))
        .await?;

        for statement in sql::upsert_captured_table(
            self.cts(),
            table,
            &primary_keys,
            table.cdc_policy(),
        ) {
            self.batch_execute(&statement)
                .await
                .map_err(|e| WarehouseError::Bookkeeping(e.to_string()))?;
        }
        for statement in sql::replace_source_columns(self.cts(), table, source_schema) {
            self.batch_execute(&statement)
                .await
                .map_err(|e| WarehouseError::Bookkeeping(e.to_string()))?;
        }
        info!(table = %table.qualified_name(), "created target table");
        Ok(())
    }

    async fn get_batches_for_full_refresh(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "postgres cannot extract changes; {} belongs on the source",
            table.qualified_name()
        )))
    }

    async fn get_delete_batches_for_stream(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "postgres cannot extract changes; {} belongs on the source",
            table.qualified_name()
        )))
    }

    async fn get_insert_batches_for_stream(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "postgres cannot extract changes; {} belongs on the source",
            table.qualified_name()
        )))
    }

    async fn process_insert_batches(
        &mut self,
        table: &TableSpec,
        mut batches: RowBatchStream,
        normalizer: &ValueNormalizer,
    ) -> Result<(), WarehouseError> {
        let columns = self.target_column_names(table).await?;
        if columns.is_empty() {
            return Err(WarehouseError::DataPlane(format!(
                "target table {} has no columns; run `melchi setup` first",
                self.full_table_name(table)
            )));
        }

        let mut applied = 0usize;
        while let Some(batch) = batches.next().await {
            let batch = normalizer.normalize_batch(batch?);
            if batch.is_empty() {
                continue;
            }
            let indexes: Vec<Option<usize>> =
                columns.iter().map(|c| batch.column_index(c)).collect();
            let tuples: Vec<String> = batch
                .rows
                .iter()
                .map(|row| render_tuple(row, &indexes))
                .collect();
            applied += tuples.len();
            self.batch_execute(&sql::insert_rows(table, &columns, &tuples))
                .await
                .map_err(|e| WarehouseError::DataPlane(e.to_string()))?;
        }
        debug!(
            table = %table.qualified_name(),
            rows = applied,
            "applied insert batches"
        );
        Ok(())
    }

    async fn process_delete_batches(
        &mut self,
        table: &TableSpec,
        mut batches: RowBatchStream,
        normalizer: &ValueNormalizer,
    ) -> Result<(), WarehouseError> {
        let keys = self.fetch_primary_keys(table).await?;
        if keys.is_empty() {
            return Err(WarehouseError::DataPlane(format!(
                "no effective key recorded for {}; cannot apply deletes",
                self.full_table_name(table)
            )));
        }

        let mut applied = 0usize;
        while let Some(batch) = batches.next().await {
            let batch = normalizer.normalize_batch(batch?);
            if batch.is_empty() {
                continue;
            }
            let indexes: Vec<Option<usize>> = keys.iter().map(|k| batch.column_index(k)).collect();
            let tuples: Vec<String> = batch
                .rows
                .iter()
                .map(|row| render_tuple(row, &indexes))
                .collect();
            applied += tuples.len();
            for statement in sql::delete_via_staged_keys(table, &keys, &tuples) {
                self.batch_execute(&statement)
                    .await
                    .map_err(|e| WarehouseError::DataPlane(e.to_string()))?;
            }
        }
        debug!(
            table = %table.qualified_name(),
            rows = applied,
            "applied delete batches"
        );
        Ok(())
    }

    async fn truncate_table(&mut self, table: &TableSpec) -> Result<(), WarehouseError> {
        self.batch_execute(&sql::truncate(table)).await
    }

    async fn prepare_stream_ingestion(
        &mut self,
        table: &TableSpec,
        _new_etl_id: &EtlId,
        _completed_etl_ids: &[EtlId],
    ) -> Result<(), WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "postgres has no source streams; {} belongs on the source",
            table.qualified_name()
        )))
    }

    async fn cleanup_source(&mut self, table: &TableSpec) -> Result<(), WarehouseError> {
        Err(WarehouseError::NotSupported(format!(
            "postgres has no source staging; {} belongs on the source",
            table.qualified_name()
        )))
    }

    async fn update_cdc_trackers(
        &mut self,
        table: &TableSpec,
        etl_id: &EtlId,
    ) -> Result<(), WarehouseError> {
        for statement in [
            sql::touch_captured_table(self.cts(), table),
            sql::append_etl_event(self.cts(), table, etl_id),
        ] {
            self.batch_execute(&statement)
                .await
                .map_err(|e| WarehouseError::Bookkeeping(e.to_string()))?;
        }
        Ok(())
    }

    async fn get_etl_ids(&mut self, table: &TableSpec) -> Result<Vec<EtlId>, WarehouseError> {
        let rows = self
            .client()?
            .query(
                &sql::select_etl_ids(self.cts()),
                &[&table.schema(), &table.table()],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| EtlId::new(row.get::<_, String>(0)))
            .collect())
    }

    async fn execute_query(
        &mut self,
        sql_text: &str,
        return_rows: bool,
    ) -> Result<Option<RowBatch>, WarehouseError> {
        if !return_rows {
            self.batch_execute(sql_text).await?;
            return Ok(None);
        }
        let rows = self.client()?.query(sql_text, &[]).await?;
        let columns: Vec<BatchColumn> = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| BatchColumn::new(c.name(), c.type_().name().to_uppercase()))
                    .collect()
            })
            .unwrap_or_default();
        let decoded = rows
            .iter()
            .map(|row| {
                Row::new(
                    (0..row.columns().len())
                        .map(|idx| decode_pg_value(row, idx))
                        .collect(),
                )
            })
            .collect();
        Ok(Some(RowBatch::new(columns, decoded)))
    }
}

fn render_tuple(row: &Row, indexes: &[Option<usize>]) -> String {
    let values = indexes
        .iter()
        .map(|idx| {
            idx.and_then(|i| row.get(i))
                .unwrap_or(&Value::Null)
                .sql_literal()
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("({values})")
}

fn decode_pg_value(row: &tokio_postgres::Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();
    if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null)
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(Value::Timestamp)
            .unwrap_or(Value::Null)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(Value::TimestampTz)
            .unwrap_or(Value::Null)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(Value::Json)
            .unwrap_or(Value::Null)
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    } else {
        row.try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::Str)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_render_null_for_unmatched_columns() {
        let row = Row::new(vec![Value::Int(1), Value::Str("a".into())]);
        assert_eq!(
            render_tuple(&row, &[Some(1), None, Some(0)]),
            "('a', NULL, 1)"
        );
    }
}
