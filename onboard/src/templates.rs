//! Configuration rows generated for a new dataset, seeded from the table
//! templates in the application config.

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::metadata::{self, empty_field_sheet, strip_extension};
use crate::sheet::{Sheet, Value};
use crate::upload::UploadedTable;

pub const DATASET_INFO_TABLE: &str = "sys_config_dataset_info";
pub const PRE_PROC_INFO_TABLE: &str = "sys_config_pre_proc_info";
pub const TABLE_INFO_TABLE: &str = "sys_config_table_info";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Table config not found for {0}")]
    MissingTable(String),
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Free-text and selected fields of the onboarding form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingForm {
    pub src_nm: String,
    pub domn_nm: String,
    pub dataset_nm: String,
    pub table_nm: String,
    pub data_clasfctn_nm: String,
    pub fmt_type_cd: String,
    pub delmtr_cd: String,
    pub dprct_methd_cd: String,
    /// Target warehouse, e.g. `Snowflake`.
    pub dialect: String,
    /// Compute role / warehouse name.
    pub warehouse_nm: String,
}

impl OnboardingForm {
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.src_nm.trim().is_empty() {
            return Err(TemplateError::MissingField("Source Name"));
        }
        if self.dataset_nm.trim().is_empty() {
            return Err(TemplateError::MissingField("Dataset Name"));
        }
        Ok(())
    }

    /// Set one field by its form name; unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "src_nm" => &mut self.src_nm,
            "domn_nm" => &mut self.domn_nm,
            "dataset_nm" => &mut self.dataset_nm,
            "table_nm" => &mut self.table_nm,
            "data_clasfctn_nm" => &mut self.data_clasfctn_nm,
            "fmt_type_cd" => &mut self.fmt_type_cd,
            "delmtr_cd" => &mut self.delmtr_cd,
            "dprct_methd_cd" => &mut self.dprct_methd_cd,
            "dialect" => &mut self.dialect,
            "warehouse_nm" => &mut self.warehouse_nm,
            _ => return false,
        };
        *slot = value.trim().to_string();
        true
    }
}

/// The four editable sheets behind one onboarding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    pub metadata: Sheet,
    pub dataset_info: Sheet,
    pub pre_proc_info: Sheet,
    pub table_info: Sheet,
}

fn one_row(
    config: &AppConfig,
    table: &str,
    overrides: &[(&str, String)],
) -> Result<Sheet, TemplateError> {
    let template = config
        .table(table)
        .ok_or_else(|| TemplateError::MissingTable(table.to_string()))?;
    let mut sheet = Sheet::new(table, template.columns.iter().cloned());
    sheet.push_with(|col| {
        overrides
            .iter()
            .find(|(k, _)| *k == col)
            .map(|(_, v)| Value::text(v.clone()))
            .or_else(|| template.defaults.get(col).map(|v| Value::text(v.clone())))
    });
    Ok(sheet)
}

pub fn dataset_info(
    config: &AppConfig,
    src_nm: &str,
    dataset_nm: &str,
    dialect: &str,
    warehouse_nm: &str,
) -> Result<Sheet, TemplateError> {
    tracing::debug!(src = %src_nm, dataset = %dataset_nm, "generating dataset info");
    one_row(
        config,
        DATASET_INFO_TABLE,
        &[
            ("src_nm", src_nm.to_string()),
            ("dataset_nm", dataset_nm.to_string()),
            ("trgt_dw_list", dialect.to_string()),
            ("cmput_whse_nm", warehouse_nm.to_string()),
        ],
    )
}

pub fn pre_proc_info(
    config: &AppConfig,
    src_nm: &str,
    dataset_nm: &str,
    fmt_type_cd: &str,
) -> Result<Sheet, TemplateError> {
    tracing::debug!(src = %src_nm, dataset = %dataset_nm, "generating pre-processing info");
    one_row(
        config,
        PRE_PROC_INFO_TABLE,
        &[
            ("src_nm", src_nm.to_string()),
            ("dataset_nm", dataset_nm.to_string()),
            ("fmt_type_cd", fmt_type_cd.to_string()),
        ],
    )
}

/// `table_nm` names the target table; `file_name` is recorded as the file pattern.
pub fn table_info(
    config: &AppConfig,
    form: &OnboardingForm,
    table_nm: &str,
    file_name: &str,
) -> Result<Sheet, TemplateError> {
    tracing::debug!(
        src = %form.src_nm,
        domain = %form.domn_nm,
        dataset = %form.dataset_nm,
        table = %table_nm,
        "generating table info"
    );
    let name = strip_extension(table_nm).to_string();
    one_row(
        config,
        TABLE_INFO_TABLE,
        &[
            ("src_nm", form.src_nm.clone()),
            ("domn_nm", form.domn_nm.clone()),
            ("dataset_nm", form.dataset_nm.clone()),
            ("redshift_table_nm", name.clone()),
            ("src_table_nm", name),
            ("data_clasfctn_nm", form.data_clasfctn_nm.clone()),
            ("fmt_type_cd", form.fmt_type_cd.clone()),
            ("delmtr_cd", form.delmtr_cd.clone()),
            ("file_patrn_txt", file_name.to_string()),
            ("dprct_methd_cd", form.dprct_methd_cd.clone()),
        ],
    )
}

/// Infer field metadata for every uploaded table and build the three
/// configuration sheets around it.
///
/// A single uploaded file is named by the form's table name when given;
/// files from a bundle are named after themselves. Tables with no rows
/// contribute no table-info row.
pub fn build_templates(
    config: &AppConfig,
    form: &OnboardingForm,
    tables: &[UploadedTable],
) -> Result<Templates, TemplateError> {
    let single = tables.len() == 1;
    let mut fields = empty_field_sheet();
    let mut table_rows = Sheet::new(TABLE_INFO_TABLE, Vec::<String>::new());

    for table in tables {
        let table_nm = if single && !form.table_nm.is_empty() {
            form.table_nm.as_str()
        } else {
            table.file_name.as_str()
        };
        let extracted = metadata::extract_metadata(&table.frame, &form.src_nm, table_nm);
        if extracted.is_empty() {
            continue;
        }
        fields.append(extracted);
        table_rows.append(table_info(config, form, table_nm, &table.file_name)?);
    }

    if table_rows.columns.is_empty() {
        let template = config
            .table(TABLE_INFO_TABLE)
            .ok_or_else(|| TemplateError::MissingTable(TABLE_INFO_TABLE.to_string()))?;
        table_rows.columns = template.columns.clone();
    }

    Ok(Templates {
        metadata: fields,
        dataset_info: dataset_info(
            config,
            &form.src_nm,
            &form.dataset_nm,
            &form.dialect,
            &form.warehouse_nm,
        )?,
        pre_proc_info: pre_proc_info(config, &form.src_nm, &form.dataset_nm, &form.fmt_type_cd)?,
        table_info: table_rows,
    })
}
