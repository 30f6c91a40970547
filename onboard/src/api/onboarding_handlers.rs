use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Json, Response},
};

use crate::config::FormOptions;
use crate::service::{GeneratedTemplates, Scripts, Upload, prepare_zip};
use crate::templates::OnboardingForm;

use super::{
    ApiErr, ApiState,
    dto::{
        GitPushResponse, RdsScriptRequest, RdsScriptResponse, ScriptBundleRequest, ScriptsRequest,
    },
    jwt::DeveloperClaims,
};

/// Choices offered by the onboarding form's dropdowns.
pub async fn options(
    DeveloperClaims(_): DeveloperClaims,
    State(state): State<ApiState>,
) -> Json<FormOptions> {
    Json(state.config.options.clone())
}

/// Multipart form: the text fields of [`OnboardingForm`] plus an optional
/// `file` part. The file may be omitted for an already registered dataset.
pub async fn generate_templates(
    DeveloperClaims(claims): DeveloperClaims,
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<GeneratedTemplates>, ApiErr> {
    let mut form = OnboardingForm::default();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiErr::bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiErr::bad_request(e.to_string()))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                upload = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiErr::bad_request(e.to_string()))?;
            form.set(&name, value);
        }
    }

    tracing::info!(user = %claims.username, src = %form.src_nm, dataset = %form.dataset_nm, "generating templates");
    Ok(Json(state.onboarding.generate_templates(&form, upload).await?))
}

pub async fn generate_scripts(
    DeveloperClaims(_): DeveloperClaims,
    State(state): State<ApiState>,
    Json(body): Json<ScriptsRequest>,
) -> Result<Json<Scripts>, ApiErr> {
    Ok(Json(
        state
            .onboarding
            .generate_sql_scripts(&body.form, &body.templates)
            .await?,
    ))
}

pub async fn download_zip(
    DeveloperClaims(_): DeveloperClaims,
    Json(body): Json<ScriptBundleRequest>,
) -> Result<Response, ApiErr> {
    let (file_name, bytes) = prepare_zip(&body.scripts, &body.src_nm, &body.dataset_nm)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn push_to_git(
    DeveloperClaims(claims): DeveloperClaims,
    State(state): State<ApiState>,
    Json(body): Json<ScriptBundleRequest>,
) -> Result<Json<GitPushResponse>, ApiErr> {
    let branch = state
        .onboarding
        .git_push_scripts(&body.scripts, &body.src_nm, &body.dataset_nm)
        .await?;
    tracing::info!(user = %claims.username, %branch, "scripts pushed to git");
    Ok(Json(GitPushResponse { branch }))
}

pub async fn insert_into_rds(
    DeveloperClaims(claims): DeveloperClaims,
    State(state): State<ApiState>,
    Json(body): Json<RdsScriptRequest>,
) -> Result<Json<RdsScriptResponse>, ApiErr> {
    if body.script.trim().is_empty() {
        return Err(ApiErr::bad_request("Script is empty"));
    }
    state.onboarding.insert_into_rds(&body.script).await?;
    tracing::info!(user = %claims.username, "configuration script executed");
    Ok(Json(RdsScriptResponse {
        message: "SQL script executed successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, json_body, make_state, setup_db, token};
    use crate::entity::app_user::Role;
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode},
        routing::{get, post},
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn make_router(state: ApiState) -> Router {
        Router::new()
            .route("/onboarding/options", get(options))
            .route("/onboarding/templates", post(generate_templates))
            .route("/onboarding/scripts", post(generate_scripts))
            .route("/onboarding/scripts/zip", post(download_zip))
            .route("/onboarding/scripts/rds", post(insert_into_rds))
            .with_state(state)
    }

    fn dev_token() -> String {
        token(Uuid::now_v7(), "dev1", Role::Developer)
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Body {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn templates_request(token: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/onboarding/templates")
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap()
    }

    fn post_json(uri: &str, token: &str, value: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .body(json_body(value))
            .unwrap()
    }

    const FORM: [(&str, &str); 4] = [
        ("src_nm", "fin"),
        ("dataset_nm", "sales"),
        ("fmt_type_cd", "csv"),
        ("dialect", "Snowflake"),
    ];

    #[tokio::test]
    async fn options_are_served_to_developers_only() {
        let router = make_router(make_state(setup_db().await));
        let ok = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/onboarding/options")
                    .header("Authorization", format!("Bearer {}", dev_token()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_json(ok).await["flag_values"], serde_json::json!(["Y", "N"]));

        let analyst = token(Uuid::now_v7(), "a1", Role::Analyst);
        let denied = router
            .oneshot(
                Request::builder()
                    .uri("/onboarding/options")
                    .header("Authorization", format!("Bearer {analyst}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upload_generates_templates_then_scripts() {
        let router = make_router(make_state(setup_db().await));
        let token = dev_token();

        let res = router
            .clone()
            .oneshot(templates_request(
                &token,
                multipart_body(&FORM, Some(("orders.csv", b"id,name\n1,a\n2,b\n"))),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let generated = body_json(res).await;
        assert_eq!(generated["existing"], false);
        assert_eq!(generated["metadata"]["rows"].as_array().unwrap().len(), 2);

        let form: serde_json::Value = FORM
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let templates = serde_json::json!({
            "metadata": generated["metadata"],
            "dataset_info": generated["dataset_info"],
            "pre_proc_info": generated["pre_proc_info"],
            "table_info": generated["table_info"],
        });
        let res = router
            .oneshot(post_json(
                "/onboarding/scripts",
                &token,
                serde_json::json!({"form": form, "templates": templates}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let scripts = body_json(res).await;
        assert!(scripts["land"].as_str().unwrap().starts_with("CREATE TABLE landing.fin_sales_orders"));
        assert!(scripts["rds"].as_str().unwrap().contains("INSERT INTO sys_config_table_field_info"));
    }

    #[tokio::test]
    async fn unsupported_upload_is_rejected() {
        let res = make_router(make_state(setup_db().await))
            .oneshot(templates_request(
                &dev_token(),
                multipart_body(&FORM, Some(("notes.txt", b"hello"))),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(res).await["error"], "Unsupported file type.");
    }

    #[tokio::test]
    async fn missing_dataset_name_is_bad_request() {
        let res = make_router(make_state(setup_db().await))
            .oneshot(templates_request(
                &dev_token(),
                multipart_body(&[("src_nm", "fin")], Some(("a.csv", b"id\n1\n"))),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Dataset Name is required");
    }

    #[tokio::test]
    async fn zip_download_sets_attachment_name() {
        let res = make_router(make_state(setup_db().await))
            .oneshot(post_json(
                "/onboarding/scripts/zip",
                &dev_token(),
                serde_json::json!({
                    "src_nm": "fin",
                    "dataset_nm": "sales",
                    "scripts": {"land": "L", "stage": "S", "rds": "R"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            res.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"fin_sales_Onboarding_Files.zip\""
        );
    }

    #[tokio::test]
    async fn rds_script_runs_against_configuration_tables() {
        let res = make_router(make_state(setup_db().await))
            .oneshot(post_json(
                "/onboarding/scripts/rds",
                &dev_token(),
                serde_json::json!({
                    "script": "INSERT INTO sys_config_dataset_info (src_nm, dataset_nm) VALUES\n('fin', 'sales');"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
