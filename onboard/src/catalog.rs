//! Reads and writes against the configuration tables
//! (`sys_config_*`), which are addressed by name rather than through entities
//! so the schema qualifier stays configurable.

use std::sync::Arc;

use sea_orm::sea_query::{
    Alias, Asterisk, Cond, Expr, Func, IntoTableRef, Order, Query, SelectStatement, TableRef,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, JsonValue, TransactionTrait};

use crate::config::AppConfig;
use crate::metadata::{FIELD_INFO_COLUMNS, FIELD_INFO_TABLE, strip_extension};
use crate::sheet::Sheet;
use crate::templates::{
    DATASET_INFO_TABLE, PRE_PROC_INFO_TABLE, TABLE_INFO_TABLE, TemplateError, Templates,
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Clone)]
pub struct Catalog {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
}

impl Catalog {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    fn table_ref(&self, table: &str) -> TableRef {
        match self.config.rds.schema.as_deref() {
            Some(schema) if !schema.is_empty() => {
                (Alias::new(schema), Alias::new(table)).into_table_ref()
            }
            _ => Alias::new(table).into_table_ref(),
        }
    }

    fn columns_of(&self, table: &str) -> Result<Vec<String>, TemplateError> {
        if table == FIELD_INFO_TABLE {
            return Ok(FIELD_INFO_COLUMNS.iter().map(|c| c.to_string()).collect());
        }
        self.config
            .table(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| TemplateError::MissingTable(table.to_string()))
    }

    async fn any_row(&self, table: &str, filters: &[(&str, &str)]) -> Result<bool, DbErr> {
        let mut select = Query::select();
        select.expr(Expr::val(1)).from(self.table_ref(table)).limit(1);
        for (column, value) in filters {
            select.and_where(Expr::col(Alias::new(*column)).eq(*value));
        }
        let stmt = self.db.get_database_backend().build(&select);
        Ok(self.db.query_one(stmt).await?.is_some())
    }

    async fn fetch(&self, table: &str, select: &SelectStatement) -> Result<Sheet, CatalogError> {
        let columns = self.columns_of(table)?;
        let stmt = self.db.get_database_backend().build(select);
        let rows = JsonValue::find_by_statement(stmt).all(&self.db).await?;
        Ok(Sheet::from_json_rows(table, &columns, &rows))
    }

    fn select_where(&self, table: &str, filters: &[(&str, &str)]) -> SelectStatement {
        let mut select = Query::select();
        select.column(Asterisk).from(self.table_ref(table));
        for (column, value) in filters {
            select.and_where(Expr::col(Alias::new(*column)).eq(*value));
        }
        select
    }

    /// True when any configuration table already holds rows for the
    /// source/dataset/table triple.
    #[tracing::instrument(skip(self))]
    pub async fn check_existence(
        &self,
        src_nm: &str,
        dataset_nm: &str,
        table_nm: &str,
    ) -> Result<bool, DbErr> {
        let src_table_nm = strip_extension(table_nm);
        let dataset_filter = [("src_nm", src_nm), ("dataset_nm", dataset_nm)];
        let checks: [(&str, &[(&str, &str)]); 4] = [
            (DATASET_INFO_TABLE, &dataset_filter),
            (TABLE_INFO_TABLE, &dataset_filter),
            (
                FIELD_INFO_TABLE,
                &[("src_nm", src_nm), ("src_table_nm", src_table_nm)],
            ),
            (PRE_PROC_INFO_TABLE, &dataset_filter),
        ];
        for (table, filters) in checks {
            if self.any_row(table, filters).await? {
                tracing::info!(src = %src_nm, dataset = %dataset_nm, table = %table_nm, "configuration exists");
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn dataset_info(&self, src_nm: &str, dataset_nm: &str) -> Result<Sheet, CatalogError> {
        let select = self.select_where(
            DATASET_INFO_TABLE,
            &[("src_nm", src_nm), ("dataset_nm", dataset_nm)],
        );
        self.fetch(DATASET_INFO_TABLE, &select).await
    }

    pub async fn pre_proc_info(&self, src_nm: &str, dataset_nm: &str) -> Result<Sheet, CatalogError> {
        let select = self.select_where(
            PRE_PROC_INFO_TABLE,
            &[("src_nm", src_nm), ("dataset_nm", dataset_nm)],
        );
        self.fetch(PRE_PROC_INFO_TABLE, &select).await
    }

    pub async fn table_info(&self, src_nm: &str, dataset_nm: &str) -> Result<Sheet, CatalogError> {
        let mut select = self.select_where(
            TABLE_INFO_TABLE,
            &[("src_nm", src_nm), ("dataset_nm", dataset_nm)],
        );
        select.order_by(Alias::new("src_table_nm"), Order::Asc);
        self.fetch(TABLE_INFO_TABLE, &select).await
    }

    /// Field rows for the given source tables, ordered by table then position.
    pub async fn table_field_info(
        &self,
        src_nm: &str,
        src_table_nms: &[String],
    ) -> Result<Sheet, CatalogError> {
        let mut select = Query::select();
        select
            .column(Asterisk)
            .from(self.table_ref(FIELD_INFO_TABLE))
            .and_where(Expr::col(Alias::new("src_nm")).eq(src_nm))
            .and_where(Expr::col(Alias::new("src_table_nm")).is_in(src_table_nms.iter().cloned()))
            .order_by(Alias::new("src_table_nm"), Order::Asc)
            .order_by(Alias::new("field_posn_nbr"), Order::Asc);
        self.fetch(FIELD_INFO_TABLE, &select).await
    }

    /// Saved configuration for a registered dataset, shaped like freshly
    /// generated templates so it can be edited and regenerated.
    #[tracing::instrument(skip(self))]
    pub async fn saved_templates(
        &self,
        src_nm: &str,
        dataset_nm: &str,
        table_nm: &str,
    ) -> Result<Templates, CatalogError> {
        let table_info = self.table_info(src_nm, dataset_nm).await?;
        let mut tables: Vec<String> = (0..table_info.len())
            .filter_map(|i| table_info.get(i, "src_table_nm").map(ToString::to_string))
            .collect();
        let requested = strip_extension(table_nm);
        if !requested.is_empty() && !tables.iter().any(|t| t == requested) {
            tables.push(requested.to_string());
        }

        Ok(Templates {
            metadata: self.table_field_info(src_nm, &tables).await?,
            dataset_info: self.dataset_info(src_nm, dataset_nm).await?,
            pre_proc_info: self.pre_proc_info(src_nm, dataset_nm).await?,
            table_info,
        })
    }

    /// Registered datasets whose source, name or description contains
    /// `search` (case-insensitive). No search lists everything.
    pub async fn search_datasets(&self, search: Option<&str>) -> Result<Sheet, CatalogError> {
        let mut select = Query::select();
        select
            .column(Asterisk)
            .from(self.table_ref(DATASET_INFO_TABLE))
            .order_by(Alias::new("dataset_nm"), Order::Asc);
        if let Some(term) = search.map(str::trim)
            && !term.is_empty()
        {
            let pattern = format!("%{}%", term.to_lowercase());
            let mut any = Cond::any();
            for column in ["src_nm", "dataset_nm", "dataset_desc"] {
                any = any.add(
                    Expr::expr(Func::lower(Expr::col(Alias::new(column)))).like(pattern.clone()),
                );
            }
            select.cond_where(any);
        }
        self.fetch(DATASET_INFO_TABLE, &select).await
    }

    /// Field rows for every table registered under a dataset.
    pub async fn dataset_fields(&self, src_nm: &str, dataset_nm: &str) -> Result<Sheet, CatalogError> {
        let table_info = self.table_info(src_nm, dataset_nm).await?;
        let tables: Vec<String> = (0..table_info.len())
            .filter_map(|i| table_info.get(i, "src_table_nm").map(ToString::to_string))
            .collect();
        self.table_field_info(src_nm, &tables).await
    }

    /// Run a generated script in a single transaction.
    #[tracing::instrument(skip_all, fields(len = script.len()))]
    pub async fn execute_script(&self, script: &str) -> Result<(), DbErr> {
        let txn = self.db.begin().await?;
        txn.execute_unprepared(script).await?;
        txn.commit().await?;
        tracing::info!("SQL script executed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Value;
    use crate::sqlgen;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup() -> Catalog {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        Catalog::new(db, Arc::new(AppConfig::default()))
    }

    const SEED: &str = "\
INSERT INTO sys_config_dataset_info (src_nm, dataset_nm, dataset_desc, load_enbl_flg) VALUES ('fin', 'sales', 'Quarterly Sales', 'Y');
INSERT INTO sys_config_dataset_info (src_nm, dataset_nm, dataset_desc, load_enbl_flg) VALUES ('mktg', 'leads', 'Lead funnel', 'N');
INSERT INTO sys_config_table_info (src_nm, dataset_nm, src_table_nm) VALUES ('fin', 'sales', 'orders');
INSERT INTO sys_config_table_field_info (src_nm, src_table_nm, field_nm, field_posn_nbr, datatype_nm) VALUES ('fin', 'orders', 'qty', 2, 'NUMBER(38,0)');
INSERT INTO sys_config_table_field_info (src_nm, src_table_nm, field_nm, field_posn_nbr, datatype_nm) VALUES ('fin', 'orders', 'id', 1, 'NUMBER(38,0)');
";

    #[tokio::test]
    async fn existence_false_on_empty_store() {
        let catalog = setup().await;
        assert!(!catalog.check_existence("fin", "sales", "orders.csv").await.unwrap());
    }

    #[tokio::test]
    async fn existence_true_after_seed() {
        let catalog = setup().await;
        catalog.execute_script(SEED).await.unwrap();
        assert!(catalog.check_existence("fin", "sales", "orders.csv").await.unwrap());
        assert!(catalog.check_existence("fin", "other", "orders.csv").await.unwrap());
        assert!(!catalog.check_existence("hr", "people", "staff").await.unwrap());
    }

    #[tokio::test]
    async fn saved_templates_round_out_every_sheet() {
        let catalog = setup().await;
        catalog.execute_script(SEED).await.unwrap();
        let t = catalog.saved_templates("fin", "sales", "orders").await.unwrap();
        assert_eq!(t.dataset_info.len(), 1);
        assert_eq!(t.dataset_info.get(0, "dataset_desc"), Some(&Value::text("Quarterly Sales")));
        assert_eq!(t.table_info.len(), 1);
        assert!(t.pre_proc_info.is_empty());
        assert_eq!(t.metadata.len(), 2);
        assert_eq!(t.metadata.get(0, "field_nm"), Some(&Value::text("id")));
        assert_eq!(t.metadata.get(1, "field_posn_nbr"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn search_matches_any_text_column_case_insensitively() {
        let catalog = setup().await;
        catalog.execute_script(SEED).await.unwrap();
        assert_eq!(catalog.search_datasets(None).await.unwrap().len(), 2);
        let hits = catalog.search_datasets(Some("quarterly")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.get(0, "dataset_nm"), Some(&Value::text("sales")));
        assert_eq!(catalog.search_datasets(Some("MKTG")).await.unwrap().len(), 1);
        assert!(catalog.search_datasets(Some("nothing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dataset_fields_follow_table_info() {
        let catalog = setup().await;
        catalog.execute_script(SEED).await.unwrap();
        assert_eq!(catalog.dataset_fields("fin", "sales").await.unwrap().len(), 2);
        assert!(catalog.dataset_fields("mktg", "leads").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_script_rolls_back() {
        let catalog = setup().await;
        let script = "INSERT INTO sys_config_dataset_info (src_nm, dataset_nm) VALUES ('a', 'b');\nINSERT INTO no_such_table VALUES (1);";
        assert!(catalog.execute_script(script).await.is_err());
        assert!(!catalog.check_existence("a", "b", "t").await.unwrap());
    }

    #[tokio::test]
    async fn generated_inserts_then_updates_apply_cleanly() {
        let catalog = setup().await;
        let cfg = AppConfig::default();
        let form = crate::templates::OnboardingForm {
            src_nm: "fin".into(),
            dataset_nm: "sales".into(),
            fmt_type_cd: "csv".into(),
            dialect: "Snowflake".into(),
            ..Default::default()
        };
        let upload = crate::upload::read_upload("orders.csv", b"id,note\n1,a\n2,b\n", b',').unwrap();
        let mut templates = crate::templates::build_templates(&cfg, &form, &upload).unwrap();

        let exists = catalog.check_existence("fin", "sales", "orders.csv").await.unwrap();
        catalog
            .execute_script(&sqlgen::rds_script(&cfg, exists, &templates))
            .await
            .unwrap();
        assert!(catalog.check_existence("fin", "sales", "orders.csv").await.unwrap());

        templates.dataset_info.set(0, "load_enbl_flg", Some(Value::text("N")));
        catalog
            .execute_script(&sqlgen::rds_script(&cfg, true, &templates))
            .await
            .unwrap();
        let saved = catalog.dataset_info("fin", "sales").await.unwrap();
        assert_eq!(saved.get(0, "load_enbl_flg"), Some(&Value::text("N")));
        let fields = catalog.dataset_fields("fin", "sales").await.unwrap();
        assert_eq!(fields.get(0, "key_ind"), Some(&Value::text("X")));
    }

    fn bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
        use std::io::Write;
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            w.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn saved_bundle_updates_every_table_in_place() {
        let catalog = setup().await;
        let cfg = AppConfig::default();
        let form = crate::templates::OnboardingForm {
            src_nm: "fin".into(),
            dataset_nm: "sales".into(),
            fmt_type_cd: "csv".into(),
            delmtr_cd: ",".into(),
            dialect: "Snowflake".into(),
            ..Default::default()
        };
        let archive = bundle(&[
            ("orders.csv", &b"id,qty\n1,5\n2,7\n"[..]),
            ("customers.csv", &b"cust_id,name\n1,acme\n2,globex\n"[..]),
        ]);
        let upload = crate::upload::read_upload("sales.zip", &archive, b',').unwrap();
        let templates = crate::templates::build_templates(&cfg, &form, &upload).unwrap();
        assert_eq!(templates.table_info.len(), 2);
        catalog
            .execute_script(&sqlgen::rds_script(&cfg, false, &templates))
            .await
            .unwrap();

        let mut saved = catalog.saved_templates("fin", "sales", "").await.unwrap();
        assert_eq!(saved.table_info.len(), 2);
        assert_eq!(saved.metadata.len(), 4);
        let script = sqlgen::rds_script(&cfg, true, &saved);
        assert!(script.contains("AND src_table_nm = 'orders';"));
        assert!(script.contains("AND src_table_nm = 'customers';"));
        catalog.execute_script(&script).await.unwrap();

        let orders = (0..saved.table_info.len())
            .find(|&i| saved.table_info.get(i, "src_table_nm") == Some(&Value::text("orders")))
            .unwrap();
        saved.table_info.set(orders, "delmtr_cd", Some(Value::text("|")));
        catalog
            .execute_script(&sqlgen::rds_script(&cfg, true, &saved))
            .await
            .unwrap();

        let tables = catalog.table_info("fin", "sales").await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables.get(0, "src_table_nm"), Some(&Value::text("customers")));
        assert_eq!(tables.get(0, "delmtr_cd"), Some(&Value::text(",")));
        assert_eq!(tables.get(1, "src_table_nm"), Some(&Value::text("orders")));
        assert_eq!(tables.get(1, "delmtr_cd"), Some(&Value::text("|")));
        assert_eq!(catalog.dataset_fields("fin", "sales").await.unwrap().len(), 4);
    }
}
