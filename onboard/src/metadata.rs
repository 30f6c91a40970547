//! Column metadata inferred from sampled string columns.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::sheet::{Sheet, Value};
use crate::upload::Frame;

pub const FIELD_INFO_TABLE: &str = "sys_config_table_field_info";

pub const FIELD_INFO_COLUMNS: [&str; 18] = [
    "src_nm",
    "src_table_nm",
    "field_nm",
    "field_posn_nbr",
    "datatype_nm",
    "datatype_size_val",
    "datatype_scale_val",
    "key_ind",
    "check_table",
    "field_desc",
    "dprct_ind",
    "partitn_ind",
    "sort_key_ind",
    "dist_key_ind",
    "proc_stage_cd",
    "catlg_flg",
    "dblqt_repl_flg",
    "delta_key_ind",
];

pub const NUMBER_TYPE: &str = "NUMBER(38,0)";
pub const TIMESTAMP_TYPE: &str = "TIMESTAMP_NTZ";
pub const STRING_TYPE: &str = "VARCHAR(255)";

/// Marker written to `key_ind` for primary-key candidates.
pub const KEY_MARKER: &str = "X";

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%d.%m.%Y",
];

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_numeric)
}

fn is_timestamp(s: &str) -> bool {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
}

/// Classify a column from its non-null sampled values.
pub fn infer_type(values: &[&str]) -> &'static str {
    if values.is_empty() {
        return STRING_TYPE;
    }
    if values.iter().all(|v| is_numeric(v)) {
        return NUMBER_TYPE;
    }
    if values.iter().all(|v| is_timestamp(v)) {
        return TIMESTAMP_TYPE;
    }
    STRING_TYPE
}

/// `orders.csv` -> `orders`. A leading dot is not an extension.
pub fn strip_extension(name: &str) -> &str {
    let stem = match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    };
    stem.trim()
}

pub fn empty_field_sheet() -> Sheet {
    Sheet::new(FIELD_INFO_TABLE, FIELD_INFO_COLUMNS)
}

/// One field-info row per column of `frame`, in column order.
pub fn extract_metadata(frame: &Frame, src_nm: &str, table_nm: &str) -> Sheet {
    tracing::debug!(src = %src_nm, table = %table_nm, "extracting metadata");
    let mut sheet = empty_field_sheet();
    if frame.is_empty() {
        return sheet;
    }

    let src_table_nm = strip_extension(table_nm).to_string();
    let row_count = frame.rows.len();

    for (idx, raw_name) in frame.columns.iter().enumerate() {
        let values: Vec<&str> = frame.column(idx).flatten().collect();
        let datatype_nm = infer_type(&values);
        let max_len = values.iter().map(|v| v.chars().count()).max().unwrap_or(0);
        let size = (max_len > 0).then(|| Value::Int(max_len as i64));

        let distinct: HashSet<&str> = values.iter().copied().collect();
        let is_key = !values.is_empty() && distinct.len() == row_count;

        let position = (idx + 1) as i64;
        sheet.push_with(|col| match col {
            "src_nm" => Some(Value::text(src_nm)),
            "src_table_nm" => Some(Value::text(src_table_nm.clone())),
            "field_nm" => Some(Value::text(raw_name.trim())),
            "field_posn_nbr" => Some(Value::Int(position)),
            "datatype_nm" => Some(Value::text(datatype_nm)),
            "datatype_size_val" | "datatype_scale_val" => size.clone(),
            "key_ind" => Some(Value::text(if is_key { KEY_MARKER } else { "" })),
            _ => Some(Value::text("")),
        });
    }
    sheet
}
