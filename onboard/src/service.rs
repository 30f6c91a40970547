//! The onboarding tool: templates from an upload or saved configuration,
//! SQL scripts from edited templates, and the three ways of shipping them.

use std::io::{Cursor, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogError};
use crate::config::AppConfig;
use crate::git::{GitCredentials, GitError, GitPublisher, branch_name};
use crate::sheet::Sheet;
use crate::sqlgen;
use crate::templates::{self, OnboardingForm, TemplateError, Templates};
use crate::upload::{self, UploadError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("Please upload a file to generate templates")]
    MissingUpload,
    #[error("Metadata is empty! SQL cannot be generated.")]
    EmptyMetadata,
    #[error("Error creating ZIP file: {0}")]
    Zip(String),
}

/// Templates plus whether they came from already-registered configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTemplates {
    #[serde(flatten)]
    pub templates: Templates,
    pub existing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    pub land: String,
    pub stage: String,
    pub rds: String,
}

impl Scripts {
    /// Object-store names under which a submitted request keeps each script.
    pub fn by_storage_type(&self) -> [(&'static str, &str); 3] {
        [
            ("land_ddl", self.land.as_str()),
            ("stage_ddl", self.stage.as_str()),
            ("metadata_ddl", self.rds.as_str()),
        ]
    }

    pub fn file_names(src_nm: &str, dataset_nm: &str) -> [String; 3] {
        [
            format!("{src_nm}_{dataset_nm}_land.sql"),
            format!("{src_nm}_{dataset_nm}_stage.sql"),
            format!("{src_nm}_{dataset_nm}_rds.sql"),
        ]
    }

    pub fn named_files(&self, src_nm: &str, dataset_nm: &str) -> Vec<(String, String)> {
        Self::file_names(src_nm, dataset_nm)
            .into_iter()
            .zip([&self.land, &self.stage, &self.rds])
            .map(|(name, body)| (name, body.clone()))
            .collect()
    }
}

/// An uploaded sample file as received from the client.
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Bundle the three scripts for download. Returns `(file_name, zip_bytes)`.
pub fn prepare_zip(
    scripts: &Scripts,
    src_nm: &str,
    dataset_nm: &str,
) -> Result<(String, Vec<u8>), ServiceError> {
    let zip_err = |e: &dyn std::fmt::Display| ServiceError::Zip(e.to_string());
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, body) in scripts.named_files(src_nm, dataset_nm) {
        writer.start_file(name, options).map_err(|e| zip_err(&e))?;
        writer.write_all(body.as_bytes()).map_err(|e| zip_err(&e))?;
    }
    let bytes = writer.finish().map_err(|e| zip_err(&e))?.into_inner();
    Ok((format!("{src_nm}_{dataset_nm}_Onboarding_Files.zip"), bytes))
}

fn first_table_name(fields: &Sheet) -> Option<String> {
    fields.get(0, "src_table_nm").map(ToString::to_string)
}

#[derive(Clone)]
pub struct OnboardingService {
    config: Arc<AppConfig>,
    catalog: Catalog,
}

impl OnboardingService {
    pub fn new(config: Arc<AppConfig>, catalog: Catalog) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Saved rows when the dataset is already registered, otherwise rows
    /// inferred from the upload.
    #[tracing::instrument(skip(self, upload), fields(src = %form.src_nm, dataset = %form.dataset_nm))]
    pub async fn generate_templates(
        &self,
        form: &OnboardingForm,
        upload: Option<Upload>,
    ) -> Result<GeneratedTemplates, ServiceError> {
        form.validate()?;
        let table_nm = if form.table_nm.is_empty() {
            upload.as_ref().map(|u| u.file_name.clone()).unwrap_or_default()
        } else {
            form.table_nm.clone()
        };

        if self
            .catalog
            .check_existence(&form.src_nm, &form.dataset_nm, &table_nm)
            .await?
        {
            tracing::info!("dataset already registered, loading saved configuration");
            let templates = self
                .catalog
                .saved_templates(&form.src_nm, &form.dataset_nm, &table_nm)
                .await?;
            return Ok(GeneratedTemplates {
                templates,
                existing: true,
            });
        }

        let upload = upload.ok_or(ServiceError::MissingUpload)?;
        let tables = upload::read_upload(
            &upload.file_name,
            &upload.bytes,
            upload::delimiter_byte(&form.delmtr_cd),
        )?;
        let templates = templates::build_templates(&self.config, form, &tables)?;
        tracing::info!(fields = templates.metadata.len(), tables = tables.len(), "templates generated");
        Ok(GeneratedTemplates {
            templates,
            existing: false,
        })
    }

    /// Landing and staging DDL plus the configuration-table script.
    #[tracing::instrument(skip(self, templates), fields(src = %form.src_nm, dataset = %form.dataset_nm))]
    pub async fn generate_sql_scripts(
        &self,
        form: &OnboardingForm,
        templates: &Templates,
    ) -> Result<Scripts, ServiceError> {
        form.validate()?;
        if templates.metadata.is_empty() {
            return Err(ServiceError::EmptyMetadata);
        }
        let table_nm = if form.table_nm.is_empty() {
            first_table_name(&templates.metadata).unwrap_or_default()
        } else {
            form.table_nm.clone()
        };
        let exists = self
            .catalog
            .check_existence(&form.src_nm, &form.dataset_nm, &table_nm)
            .await?;

        let ddl = &self.config.ddl;
        Ok(Scripts {
            land: sqlgen::create_table_script(
                &templates.metadata,
                &ddl.landing_schema,
                &form.src_nm,
                &form.dataset_nm,
            ),
            stage: sqlgen::create_table_script(
                &templates.metadata,
                &ddl.staging_schema,
                &form.src_nm,
                &form.dataset_nm,
            ),
            rds: sqlgen::rds_script(&self.config, exists, templates),
        })
    }

    /// Push the scripts to a fresh feature branch. Returns the branch name.
    #[tracing::instrument(skip(self, scripts))]
    pub async fn git_push_scripts(
        &self,
        scripts: &Scripts,
        src_nm: &str,
        dataset_nm: &str,
    ) -> Result<String, ServiceError> {
        let publisher = GitPublisher::new(self.config.git.clone(), GitCredentials::from_env()?)?;
        let branch = branch_name(src_nm, dataset_nm);
        let message = format!("Add onboarding scripts for {src_nm}.{dataset_nm}");
        Ok(publisher
            .push_files(&branch, &scripts.named_files(src_nm, dataset_nm), &message)
            .await?)
    }

    pub async fn insert_into_rds(&self, script: &str) -> Result<(), ServiceError> {
        self.catalog.execute_script(script).await?;
        Ok(())
    }
}
