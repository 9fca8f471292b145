use crate::error::CliError;
use model::core::{policy::CdcPolicy, table::TableSpec};
use std::{fs, path::Path};

/// Loads the replication scope from the operator's CSV. Header columns:
/// database, schema, table, cdc_type (optional, defaults to FULL_REFRESH).
pub fn load_tables(path: &Path) -> Result<Vec<TableSpec>, CliError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        CliError::Config(format!("cannot read table list {}: {e}", path.display()))
    })?;
    parse_tables(&raw)
}

pub fn parse_tables(raw: &str) -> Result<Vec<TableSpec>, CliError> {
    // Spreadsheet exports routinely lead with a BOM.
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| CliError::Config(format!("cannot read table list header: {e}")))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };

    let database = column("database")
        .ok_or_else(|| CliError::Config("table list is missing the \"database\" column".into()))?;
    let schema = column("schema")
        .ok_or_else(|| CliError::Config("table list is missing the \"schema\" column".into()))?;
    let table = column("table")
        .ok_or_else(|| CliError::Config("table list is missing the \"table\" column".into()))?;
    let cdc_type = column("cdc_type");

    let mut tables = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| CliError::Config(format!("table list row {}: {e}", line + 2)))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let policy = CdcPolicy::parse(cdc_type.and_then(|idx| record.get(idx)))?;
        tables.push(TableSpec::new(
            field(database),
            field(schema),
            field(table),
            policy,
        )?);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_defaults_missing_cdc_type() {
        let tables = parse_tables(
            "database,schema,table,cdc_type\n\
             sales_db,public,orders,standard_stream\n\
             sales_db,public,customers,\n",
        )
        .unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].cdc_policy(), CdcPolicy::StandardStream);
        assert_eq!(tables[1].cdc_policy(), CdcPolicy::FullRefresh);
        assert_eq!(tables[0].qualified_name(), "sales_db.public.orders");
    }

    #[test]
    fn tolerates_a_leading_bom() {
        let tables = parse_tables(
            "\u{feff}database,schema,table,cdc_type\nsales_db,public,orders,FULL_REFRESH\n",
        )
        .unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn cdc_type_column_may_be_absent_entirely() {
        let tables = parse_tables("database,schema,table\nsales_db,public,orders\n").unwrap();
        assert_eq!(tables[0].cdc_policy(), CdcPolicy::FullRefresh);
    }

    #[test]
    fn unknown_cdc_type_error_enumerates_the_legal_values() {
        let err = parse_tables(
            "database,schema,table,cdc_type\nsales_db,public,orders,INCREMENTAL\n",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("INCREMENTAL"));
        assert!(message.contains("FULL_REFRESH"));
        assert!(message.contains("APPEND_ONLY_STREAM"));
        assert!(message.contains("STANDARD_STREAM"));
    }

    #[test]
    fn empty_identifier_parts_are_rejected() {
        let err =
            parse_tables("database,schema,table,cdc_type\nsales_db,,orders,\n").unwrap_err();
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let err = parse_tables("database,schema\nsales_db,public\n").unwrap_err();
        assert!(err.to_string().contains("table"));
    }

    #[test]
    fn loads_the_table_list_from_disk() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database,schema,table,cdc_type").unwrap();
        writeln!(file, "sales_db,public,orders,standard_stream").unwrap();
        let tables = load_tables(file.path()).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table(), "orders");
    }
}
