//! Object storage for generated scripts, laid out as
//! `{prefix}/{status}/{request_id}/{script_type}.sql`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::Mutex;

use crate::config::StorageConfig;
use crate::entity::onboarding_request::RequestStatus;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No scripts found")]
    NoScripts,
    #[error("Script not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("Failed to move scripts: {0}")]
    Move(String),
}

impl StorageError {
    fn backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }
}

/// A stored script, as listed under a request folder.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredScript {
    pub key: String,
    pub script_type: String,
}

pub fn request_prefix(root: &str, status: RequestStatus, request_id: &str) -> String {
    format!("{root}/{}/{request_id}", status.folder())
}

pub fn script_key(root: &str, status: RequestStatus, request_id: &str, script_type: &str) -> String {
    format!("{}/{script_type}.sql", request_prefix(root, status, request_id))
}

fn script_type_of(key: &str) -> String {
    key.rsplit('/')
        .next()
        .and_then(|f| f.strip_suffix(".sql"))
        .unwrap_or_default()
        .to_string()
}

fn moved_key(key: &str, from_prefix: &str, to_prefix: &str) -> String {
    match key.strip_prefix(from_prefix) {
        Some(rest) => format!("{to_prefix}{rest}"),
        None => key.to_string(),
    }
}

#[async_trait]
pub trait ScriptStore: Send + Sync {
    fn root_prefix(&self) -> &str;

    /// Write a script for a new request. New scripts always land in `pending`.
    async fn put_script(
        &self,
        request_id: &str,
        dataset: &str,
        script_type: &str,
        content: &str,
    ) -> Result<String, StorageError>;

    async fn list_scripts(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<StoredScript>, StorageError>;

    async fn get_script(
        &self,
        request_id: &str,
        script_type: &str,
        status: RequestStatus,
    ) -> Result<String, StorageError>;

    /// Copy every script of a request to the `to` folder, then delete the
    /// originals. Individual failures are collected, not rolled back.
    async fn move_scripts(
        &self,
        request_id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<(), StorageError>;
}

pub struct S3ScriptStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    root: String,
}

impl S3ScriptStore {
    pub async fn new(bucket: String, config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(ref r) = config.region {
            loader = loader.region(aws_config::Region::new(r.clone()));
        }
        if let Some(ref ep) = config.endpoint {
            loader = loader.endpoint_url(ep);
        }
        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket,
            root: config.root_prefix.clone(),
        }
    }

    async fn keys_under(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(StorageError::backend)?;
            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
            match resp.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl ScriptStore for S3ScriptStore {
    fn root_prefix(&self) -> &str {
        &self.root
    }

    async fn put_script(
        &self,
        request_id: &str,
        dataset: &str,
        script_type: &str,
        content: &str,
    ) -> Result<String, StorageError> {
        let key = script_key(&self.root, RequestStatus::Pending, request_id, script_type);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .content_type("text/plain")
            .metadata("dataset", dataset)
            .metadata("type", script_type)
            .send()
            .await
            .map_err(StorageError::backend)?;
        tracing::info!(%key, "uploaded script");
        Ok(key)
    }

    async fn list_scripts(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<StoredScript>, StorageError> {
        let prefix = format!("{}/", request_prefix(&self.root, status, request_id));
        Ok(self
            .keys_under(&prefix)
            .await?
            .into_iter()
            .map(|key| StoredScript {
                script_type: script_type_of(&key),
                key,
            })
            .collect())
    }

    async fn get_script(
        &self,
        request_id: &str,
        script_type: &str,
        status: RequestStatus,
    ) -> Result<String, StorageError> {
        let key = script_key(&self.root, status, request_id, script_type);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_key() => StorageError::NotFound(key.clone()),
                _ => StorageError::backend(e),
            })?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(StorageError::backend)?
            .into_bytes();
        String::from_utf8(bytes.to_vec()).map_err(StorageError::backend)
    }

    async fn move_scripts(
        &self,
        request_id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<(), StorageError> {
        let from_prefix = request_prefix(&self.root, from, request_id);
        let to_prefix = request_prefix(&self.root, to, request_id);
        let keys = self.keys_under(&format!("{from_prefix}/")).await?;
        if keys.is_empty() {
            return Err(StorageError::NoScripts);
        }

        let mut errors = Vec::new();
        for key in keys {
            let target = moved_key(&key, &from_prefix, &to_prefix);
            let copied = self
                .client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(format!("{}/{key}", self.bucket))
                .key(&target)
                .send()
                .await;
            if let Err(e) = copied {
                tracing::error!(%key, error = %e, "copy failed");
                errors.push(format!("{key}: {e}"));
                continue;
            }
            if let Err(e) = self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                tracing::error!(%key, error = %e, "delete failed");
                errors.push(format!("{key}: {e}"));
            }
        }

        if errors.is_empty() {
            tracing::info!(%request_id, from = from.folder(), to = to.folder(), "moved scripts");
            Ok(())
        } else {
            Err(StorageError::Move(errors.join("; ")))
        }
    }
}

/// Body plus the same user metadata the S3 backend attaches.
#[derive(Debug, Clone)]
struct MemoryObject {
    body: String,
    metadata: BTreeMap<String, String>,
}

/// Process-local store, used when no bucket is configured.
pub struct MemoryScriptStore {
    root: String,
    objects: Mutex<BTreeMap<String, MemoryObject>>,
}

impl MemoryScriptStore {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    /// User metadata (`dataset`, `type`) stored with `key`.
    pub async fn metadata(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.objects.lock().await.get(key).map(|o| o.metadata.clone())
    }
}

#[async_trait]
impl ScriptStore for MemoryScriptStore {
    fn root_prefix(&self) -> &str {
        &self.root
    }

    async fn put_script(
        &self,
        request_id: &str,
        dataset: &str,
        script_type: &str,
        content: &str,
    ) -> Result<String, StorageError> {
        let key = script_key(&self.root, RequestStatus::Pending, request_id, script_type);
        let metadata = BTreeMap::from([
            ("dataset".to_string(), dataset.to_string()),
            ("type".to_string(), script_type.to_string()),
        ]);
        self.objects.lock().await.insert(
            key.clone(),
            MemoryObject {
                body: content.to_string(),
                metadata,
            },
        );
        Ok(key)
    }

    async fn list_scripts(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<StoredScript>, StorageError> {
        let prefix = format!("{}/", request_prefix(&self.root, status, request_id));
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|key| StoredScript {
                script_type: script_type_of(key),
                key: key.clone(),
            })
            .collect())
    }

    async fn get_script(
        &self,
        request_id: &str,
        script_type: &str,
        status: RequestStatus,
    ) -> Result<String, StorageError> {
        let key = script_key(&self.root, status, request_id, script_type);
        self.objects
            .lock()
            .await
            .get(&key)
            .map(|o| o.body.clone())
            .ok_or(StorageError::NotFound(key))
    }

    async fn move_scripts(
        &self,
        request_id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<(), StorageError> {
        let from_prefix = request_prefix(&self.root, from, request_id);
        let to_prefix = request_prefix(&self.root, to, request_id);
        let mut objects = self.objects.lock().await;
        let keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(&format!("{from_prefix}/")))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(StorageError::NoScripts);
        }
        for key in keys {
            if let Some(object) = objects.remove(&key) {
                objects.insert(moved_key(&key, &from_prefix, &to_prefix), object);
            }
        }
        Ok(())
    }
}

/// S3 when a bucket is configured, otherwise in-memory.
pub async fn build_store(config: &StorageConfig) -> Arc<dyn ScriptStore> {
    match config.bucket.as_deref().filter(|b| !b.is_empty()) {
        Some(bucket) => {
            tracing::info!(%bucket, prefix = %config.root_prefix, "using S3 script storage");
            Arc::new(S3ScriptStore::new(bucket.to_string(), config).await)
        }
        None => {
            tracing::warn!("no storage bucket configured, scripts are kept in memory");
            Arc::new(MemoryScriptStore::new(config.root_prefix.clone()))
        }
    }
}
