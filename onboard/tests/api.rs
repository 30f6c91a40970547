//! End-to-end tests of the REST API over an in-memory database and script store.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use migration::{Migrator, MigratorTrait};
use onboard::api::{ApiState, api_router};
use onboard::config::AppConfig;
use onboard::storage::MemoryScriptStore;
use sea_orm::Database;
use serde_json::{Value, json};

async fn server() -> TestServer {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let state = ApiState::new(
        db,
        Arc::new(AppConfig::default()),
        Arc::new(MemoryScriptStore::new("onboarding")),
        "integration-secret".to_string(),
        1,
    );
    TestServer::new(api_router(state)).unwrap()
}

async fn bootstrap_admin(server: &TestServer) -> String {
    let res = server
        .post("/api/v1/auth/bootstrap")
        .json(&json!({"username": "admin", "password": "admin-pw", "email": "admin@example.com"}))
        .await;
    res.assert_status(StatusCode::CREATED);
    res.json::<Value>()["token"].as_str().unwrap().to_string()
}

async fn user_token(server: &TestServer, admin: &str, username: &str, role: &str) -> String {
    server
        .post("/api/v1/users")
        .authorization_bearer(admin)
        .json(&json!({"username": username, "password": "pw", "role": role}))
        .await
        .assert_status(StatusCode::CREATED);
    let res = server
        .post("/api/v1/auth/login")
        .json(&json!({"username": username, "password": "pw"}))
        .await;
    res.assert_status_ok();
    res.json::<Value>()["token"].as_str().unwrap().to_string()
}

fn onboarding_form(file: Option<(&str, &[u8])>) -> MultipartForm {
    let form = MultipartForm::new()
        .add_text("src_nm", "fin")
        .add_text("domn_nm", "sales")
        .add_text("dataset_nm", "orders_ds")
        .add_text("fmt_type_cd", "csv")
        .add_text("delmtr_cd", ",")
        .add_text("dialect", "Snowflake")
        .add_text("warehouse_nm", "keu_fin_small");
    match file {
        Some((name, bytes)) => form.add_part(
            "file",
            Part::bytes(bytes.to_vec()).file_name(name).mime_type("text/csv"),
        ),
        None => form,
    }
}

fn form_json() -> Value {
    json!({
        "src_nm": "fin",
        "domn_nm": "sales",
        "dataset_nm": "orders_ds",
        "fmt_type_cd": "csv",
        "delmtr_cd": ",",
        "dialect": "Snowflake",
        "warehouse_nm": "keu_fin_small"
    })
}

fn templates_of(generated: &Value) -> Value {
    json!({
        "metadata": generated["metadata"],
        "dataset_info": generated["dataset_info"],
        "pre_proc_info": generated["pre_proc_info"],
        "table_info": generated["table_info"],
    })
}

#[tokio::test]
async fn health_is_public() {
    server().await.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn onboarding_flow_from_upload_to_approval() {
    let server = server().await;
    let admin = bootstrap_admin(&server).await;
    let dev = user_token(&server, &admin, "dev1", "developer").await;
    let approver = user_token(&server, &admin, "boss", "approver").await;

    // Upload a sample file and get editable templates back.
    let res = server
        .post("/api/v1/onboarding/templates")
        .authorization_bearer(&dev)
        .multipart(onboarding_form(Some((
            "orders.csv",
            b"order_id,customer,placed_at\n1,acme,2024-01-05\n2,globex,2024-01-06\n",
        ))))
        .await;
    res.assert_status_ok();
    let generated = res.json::<Value>();
    assert_eq!(generated["existing"], false);
    let fields = generated["metadata"]["rows"].as_array().unwrap();
    assert_eq!(fields.len(), 3);

    // Generate scripts from the (unedited) templates.
    let res = server
        .post("/api/v1/onboarding/scripts")
        .authorization_bearer(&dev)
        .json(&json!({"form": form_json(), "templates": templates_of(&generated)}))
        .await;
    res.assert_status_ok();
    let scripts = res.json::<Value>();
    assert!(
        scripts["land"]
            .as_str()
            .unwrap()
            .contains("placed_at TIMESTAMP_NTZ")
    );

    // Submit for approval.
    let res = server
        .post("/api/v1/requests")
        .authorization_bearer(&dev)
        .json(&json!({"dataset_name": "orders_ds", "scripts": scripts}))
        .await;
    res.assert_status(StatusCode::CREATED);
    let request_id = res.json::<Value>()["request_id"].as_str().unwrap().to_string();

    // The approver sees it in the queue and approves it.
    let pending = server
        .get("/api/v1/requests/pending")
        .authorization_bearer(&approver)
        .await
        .json::<Value>();
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let res = server
        .post(&format!("/api/v1/requests/{request_id}/approve"))
        .authorization_bearer(&approver)
        .await;
    res.assert_status_ok();
    let approved = res.json::<Value>();
    assert_eq!(approved["status"], "approved");
    assert_eq!(
        approved["storage_path"],
        format!("onboarding/approved/{request_id}")
    );

    // Scripts followed the request into the approved folder.
    let stored = server
        .get(&format!("/api/v1/requests/{request_id}/scripts"))
        .authorization_bearer(&dev)
        .await
        .json::<Value>();
    let types: Vec<&str> = stored
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["script_type"].as_str().unwrap())
        .collect();
    assert_eq!(types.len(), 3);
    assert!(types.contains(&"metadata_ddl"));

    // Admin sees the full history.
    let all = server
        .get("/api/v1/requests")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn registered_dataset_reloads_saved_configuration() {
    let server = server().await;
    let admin = bootstrap_admin(&server).await;

    let generated = server
        .post("/api/v1/onboarding/templates")
        .authorization_bearer(&admin)
        .multipart(onboarding_form(Some(("orders.csv", b"id,qty\n1,5\n2,7\n"))))
        .await
        .json::<Value>();
    let scripts = server
        .post("/api/v1/onboarding/scripts")
        .authorization_bearer(&admin)
        .json(&json!({"form": form_json(), "templates": templates_of(&generated)}))
        .await
        .json::<Value>();

    server
        .post("/api/v1/onboarding/scripts/rds")
        .authorization_bearer(&admin)
        .json(&json!({"script": scripts["rds"]}))
        .await
        .assert_status_ok();

    // No file this time: the saved rows come back flagged as existing.
    let res = server
        .post("/api/v1/onboarding/templates")
        .authorization_bearer(&admin)
        .multipart(onboarding_form(None))
        .await;
    res.assert_status_ok();
    let reloaded = res.json::<Value>();
    assert_eq!(reloaded["existing"], true);
    assert_eq!(reloaded["metadata"]["rows"].as_array().unwrap().len(), 2);

    let rerun = server
        .post("/api/v1/onboarding/scripts")
        .authorization_bearer(&admin)
        .json(&json!({"form": form_json(), "templates": templates_of(&reloaded)}))
        .await
        .json::<Value>();
    assert!(rerun["rds"].as_str().unwrap().starts_with("UPDATE sys_config_dataset_info"));

    // The explorer finds it.
    let found = server
        .get("/api/v1/catalog/datasets")
        .add_query_param("search", "orders")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(found["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn role_gates_are_enforced() {
    let server = server().await;
    let admin = bootstrap_admin(&server).await;
    let analyst = user_token(&server, &admin, "ana", "analyst").await;
    let dev = user_token(&server, &admin, "dev1", "developer").await;

    server
        .get("/api/v1/onboarding/options")
        .authorization_bearer(&analyst)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .get("/api/v1/catalog/datasets")
        .authorization_bearer(&analyst)
        .await
        .assert_status_ok();
    server
        .get("/api/v1/catalog/datasets")
        .authorization_bearer(&dev)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .get("/api/v1/users")
        .authorization_bearer(&dev)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .get("/api/v1/requests/pending")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn scripts_require_metadata() {
    let server = server().await;
    let admin = bootstrap_admin(&server).await;
    let res = server
        .post("/api/v1/onboarding/scripts")
        .authorization_bearer(&admin)
        .json(&json!({
            "form": form_json(),
            "templates": {
                "metadata": {"table": "sys_config_table_field_info", "columns": ["src_nm"], "rows": []},
                "dataset_info": {"table": "sys_config_dataset_info", "columns": [], "rows": []},
                "pre_proc_info": {"table": "sys_config_pre_proc_info", "columns": [], "rows": []},
                "table_info": {"table": "sys_config_table_info", "columns": [], "rows": []}
            }
        }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<Value>()["error"],
        "Metadata is empty! SQL cannot be generated."
    );
}
