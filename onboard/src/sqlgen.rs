//! SQL text generation: landing/staging DDL and the INSERT/UPDATE script
//! registering a dataset in the configuration tables.

use crate::config::AppConfig;
use crate::metadata::FIELD_INFO_TABLE;
use crate::sheet::{Cell, Sheet, Value};
use crate::templates::{DATASET_INFO_TABLE, PRE_PROC_INFO_TABLE, TABLE_INFO_TABLE, Templates};

pub const NO_METADATA: &str = "No metadata available to generate SQL.";

const DATASET_KEYS: [&str; 2] = ["src_nm", "dataset_nm"];
const TABLE_KEYS: [&str; 3] = ["src_nm", "dataset_nm", "src_table_nm"];
const FIELD_KEYS: [&str; 3] = ["src_nm", "src_table_nm", "field_nm"];

/// Render a cell as a SQL literal. Text is single-quoted with quotes doubled.
pub fn sql_literal(cell: &Cell) -> String {
    match cell {
        None => "NULL".to_string(),
        Some(Value::Int(i)) => i.to_string(),
        Some(Value::Text(s)) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn text_of(sheet: &Sheet, row: usize, column: &str) -> String {
    sheet
        .get(row, column)
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn is_key_flag(v: &str) -> bool {
    matches!(v.trim(), "X" | "x" | "Y" | "y")
}

/// One `CREATE TABLE` per distinct `src_table_nm`, in first-seen order.
pub fn create_table_script(fields: &Sheet, schema: &str, src_nm: &str, dataset_nm: &str) -> String {
    if fields.is_empty() {
        return NO_METADATA.to_string();
    }

    let mut tables: Vec<(String, Vec<String>)> = Vec::new();
    for row in 0..fields.len() {
        let table = text_of(fields, row, "src_table_nm");
        let mut clause = format!(
            "{} {}",
            text_of(fields, row, "field_nm"),
            text_of(fields, row, "datatype_nm")
        );
        if is_key_flag(&text_of(fields, row, "key_ind")) {
            clause.push_str(" PRIMARY KEY");
        }
        match tables.iter_mut().find(|(t, _)| *t == table) {
            Some((_, clauses)) => clauses.push(clause),
            None => tables.push((table, vec![clause])),
        }
    }

    tables
        .iter()
        .map(|(table, clauses)| {
            format!(
                "CREATE TABLE {schema}.{src_nm}_{dataset_nm}_{table} (\n{}\n);",
                clauses.join(",\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn insert_statement(table: &str, sheet: &Sheet) -> String {
    if sheet.is_empty() {
        return format!("-- No data to insert into {table}");
    }
    let columns = sheet.columns.join(", ");
    let values = sheet
        .rows
        .iter()
        .map(|row| {
            let literals: Vec<String> = row.iter().map(sql_literal).collect();
            format!("({})", literals.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!("INSERT INTO {table} ({columns}) VALUES\n{values};")
}

/// One `UPDATE` per row: `keys` columns form the WHERE clause, every other
/// column is assigned. Rows with nothing to set or no key are skipped.
pub fn update_statement(table: &str, sheet: &Sheet, keys: &[&str]) -> String {
    if sheet.is_empty() {
        return format!("-- No data to update in {table}");
    }

    let mut queries = Vec::new();
    for row in &sheet.rows {
        let mut set_clauses = Vec::new();
        let mut where_clauses = Vec::new();
        for (column, cell) in sheet.columns.iter().zip(row) {
            let clause = format!("{column} = {}", sql_literal(cell));
            if keys.contains(&column.as_str()) {
                where_clauses.push(clause);
            } else {
                set_clauses.push(clause);
            }
        }
        if set_clauses.is_empty() || where_clauses.is_empty() {
            continue;
        }
        queries.push(format!(
            "UPDATE {table} SET {} WHERE {};",
            set_clauses.join(", "),
            where_clauses.join(" AND ")
        ));
    }
    queries.join("\n")
}

/// Configuration-table script: UPDATEs when the dataset is already
/// registered, INSERTs otherwise.
pub fn rds_script(config: &AppConfig, exists: bool, templates: &Templates) -> String {
    let parts: [(&str, &Sheet, &[&str]); 4] = [
        (DATASET_INFO_TABLE, &templates.dataset_info, &DATASET_KEYS),
        (PRE_PROC_INFO_TABLE, &templates.pre_proc_info, &DATASET_KEYS),
        (TABLE_INFO_TABLE, &templates.table_info, &TABLE_KEYS),
        (FIELD_INFO_TABLE, &templates.metadata, &FIELD_KEYS),
    ];

    parts
        .iter()
        .map(|(table, sheet, keys)| {
            let qualified = config.rds_table(table);
            if exists {
                update_statement(&qualified, sheet, keys)
            } else {
                insert_statement(&qualified, sheet)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
