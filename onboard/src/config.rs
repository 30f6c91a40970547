//! Application configuration loaded from a JSON file.
//!
//! Server settings (bind address, database URL, JWT secret) come from `ONB_*`
//! environment variables in `main`; everything describing the onboarding
//! domain lives here so it can be versioned alongside the deployment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tables: Vec<TableTemplate>,
    pub storage: StorageConfig,
    pub git: GitConfig,
    pub rds: RdsConfig,
    pub ddl: DdlConfig,
    pub options: FormOptions,
}

/// Column layout and default values for one configuration table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTemplate {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// No bucket means scripts are kept in process memory.
    pub bucket: Option<String>,
    pub root_prefix: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub host: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub bot_name: String,
    pub bot_email: String,
    /// Repository folder the scripts are written to, relative to the repo root.
    pub scripts_folder: String,
    /// Full remote URL used instead of `https://{user}:{token}@{host}/{owner}/{repo}.git`.
    /// Credentials are not inserted into it.
    pub remote_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RdsConfig {
    /// Schema qualifying the configuration tables in generated and executed SQL.
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DdlConfig {
    pub landing_schema: String,
    pub staging_schema: String,
}

/// Choice lists offered by the onboarding form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub format_types: Vec<String>,
    pub deprecation_methods: Vec<String>,
    pub data_classifications: Vec<String>,
    pub target_warehouses: Vec<String>,
    pub compute_roles: Vec<String>,
    pub priority_codes: Vec<String>,
    pub target_dw_lists: Vec<String>,
    pub flag_values: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn defaults(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tables: vec![
                TableTemplate {
                    name: "sys_config_dataset_info".into(),
                    columns: strings(&[
                        "src_nm",
                        "dataset_nm",
                        "dataset_desc",
                        "trgt_dw_list",
                        "cmput_whse_nm",
                        "serv_now_priorty_cd",
                        "load_enbl_flg",
                        "manl_upld_flg",
                        "whse_load_enbl_flg",
                        "actv_flg",
                    ]),
                    defaults: defaults(&[
                        ("dataset_desc", ""),
                        ("serv_now_priorty_cd", "P3"),
                        ("load_enbl_flg", "Y"),
                        ("manl_upld_flg", "N"),
                        ("whse_load_enbl_flg", "Y"),
                        ("actv_flg", "Y"),
                    ]),
                },
                TableTemplate {
                    name: "sys_config_pre_proc_info".into(),
                    columns: strings(&[
                        "src_nm",
                        "dataset_nm",
                        "fmt_type_cd",
                        "hdr_row_cnt",
                        "trlr_row_cnt",
                        "encdng_cd",
                        "cmprsn_cd",
                        "actv_flg",
                    ]),
                    defaults: defaults(&[
                        ("hdr_row_cnt", "1"),
                        ("trlr_row_cnt", "0"),
                        ("encdng_cd", "UTF-8"),
                        ("cmprsn_cd", ""),
                        ("actv_flg", "Y"),
                    ]),
                },
                TableTemplate {
                    name: "sys_config_table_info".into(),
                    columns: strings(&[
                        "src_nm",
                        "domn_nm",
                        "dataset_nm",
                        "redshift_table_nm",
                        "src_table_nm",
                        "data_clasfctn_nm",
                        "fmt_type_cd",
                        "delmtr_cd",
                        "file_patrn_txt",
                        "dprct_methd_cd",
                        "load_type_cd",
                        "actv_flg",
                    ]),
                    defaults: defaults(&[("load_type_cd", "full"), ("actv_flg", "Y")]),
                },
            ],
            storage: StorageConfig::default(),
            git: GitConfig::default(),
            rds: RdsConfig::default(),
            ddl: DdlConfig::default(),
            options: FormOptions::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            root_prefix: "onboarding".into(),
            region: None,
            endpoint: None,
            force_path_style: false,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            host: "github.com".into(),
            repo_owner: String::new(),
            repo_name: String::new(),
            bot_name: "onboarding-bot".into(),
            bot_email: "onboarding-bot@users.noreply.github.com".into(),
            scripts_folder: "sql".into(),
            remote_url: None,
        }
    }
}

impl Default for DdlConfig {
    fn default() -> Self {
        Self {
            landing_schema: "landing".into(),
            staging_schema: "staging".into(),
        }
    }
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            format_types: strings(&["csv", "excel", "txt", "zip", "json", "parquet", "orc"]),
            deprecation_methods: strings(&[
                "okrdra",
                "orrrra",
                "okkkra",
                "okkkra_extrctr",
                "okkkka",
                "file_cntl_upsrt_repl",
            ]),
            data_classifications: strings(&["confd", "intrnl"]),
            target_warehouses: strings(&["Snowflake", "Redshift"]),
            compute_roles: strings(&[
                "keu_it_small",
                "keu_fin_small",
                "keu_elt_analytic_small",
                "keu_elt_supplychain_small",
            ]),
            priority_codes: strings(&["P1", "P2", "P3", "P4", "P5"]),
            target_dw_lists: strings(&["snowflake", "redshift", "redshift|snowflake"]),
            flag_values: strings(&["Y", "N"]),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from `ONB_CONFIG` (which must exist when set), else from
    /// [`DEFAULT_CONFIG_PATH`] when present, else built-in defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("ONB_CONFIG") {
            return Self::load(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            tracing::warn!(
                path = DEFAULT_CONFIG_PATH,
                "config file not found, using built-in defaults"
            );
            Ok(Self::default())
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableTemplate> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// `{schema}.{table}` when a configuration schema is set, else the bare name.
    pub fn rds_table(&self, table: &str) -> String {
        match self.rds.schema.as_deref() {
            Some(schema) if !schema.is_empty() => format!("{schema}.{table}"),
            _ => table.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"storage": {"bucket": "scripts"}, "rds": {"schema": "app_mgmt"}}"#)
                .unwrap();
        assert_eq!(cfg.storage.bucket.as_deref(), Some("scripts"));
        assert_eq!(cfg.storage.root_prefix, "onboarding");
        assert_eq!(cfg.tables.len(), 3);
        assert_eq!(cfg.ddl.landing_schema, "landing");
    }

    #[test]
    fn rds_table_qualifies_only_with_schema() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.rds_table("sys_config_table_info"), "sys_config_table_info");
        cfg.rds.schema = Some("app_mgmt".into());
        assert_eq!(
            cfg.rds_table("sys_config_table_info"),
            "app_mgmt.sys_config_table_info"
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/config.json");
        let cfg = AppConfig::load(&path).unwrap();
        assert!(cfg.table("sys_config_dataset_info").is_some());
        assert!(cfg.table("sys_config_pre_proc_info").is_some());
        assert!(cfg.table("sys_config_table_info").is_some());
    }
}
