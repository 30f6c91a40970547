use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use crate::sheet::Sheet;
use crate::sqlgen;

use super::{
    ApiErr, ApiState,
    dto::{DatasetFieldsResponse, DatasetSearchQuery},
    jwt::AnalystClaims,
};

pub async fn search_datasets(
    AnalystClaims(_): AnalystClaims,
    State(state): State<ApiState>,
    Query(params): Query<DatasetSearchQuery>,
) -> Result<Json<Sheet>, ApiErr> {
    let datasets = state
        .onboarding
        .catalog()
        .search_datasets(params.search.as_deref())
        .await?;
    Ok(Json(datasets))
}

pub async fn dataset_fields(
    AnalystClaims(_): AnalystClaims,
    State(state): State<ApiState>,
    Path((src_nm, dataset_nm)): Path<(String, String)>,
) -> Result<Json<DatasetFieldsResponse>, ApiErr> {
    let fields = state
        .onboarding
        .catalog()
        .dataset_fields(&src_nm, &dataset_nm)
        .await?;
    let staging_ddl = sqlgen::create_table_script(
        &fields,
        &state.config.ddl.staging_schema,
        &src_nm,
        &dataset_nm,
    );
    Ok(Json(DatasetFieldsResponse {
        fields,
        staging_ddl,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, make_state, setup_db, token};
    use crate::entity::app_user::Role;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    const SEED: &str = "\
INSERT INTO sys_config_dataset_info (src_nm, dataset_nm, dataset_desc) VALUES ('fin', 'sales', 'Quarterly Sales');
INSERT INTO sys_config_table_info (src_nm, dataset_nm, src_table_nm) VALUES ('fin', 'sales', 'orders');
INSERT INTO sys_config_table_field_info (src_nm, src_table_nm, field_nm, field_posn_nbr, datatype_nm, key_ind) VALUES ('fin', 'orders', 'id', 1, 'NUMBER(38,0)', 'X');
";

    fn make_router(state: ApiState) -> Router {
        Router::new()
            .route("/catalog/datasets", get(search_datasets))
            .route(
                "/catalog/datasets/{src_nm}/{dataset_nm}/fields",
                get(dataset_fields),
            )
            .with_state(state)
    }

    fn get_as(uri: &str, role: Role) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(
                "Authorization",
                format!("Bearer {}", token(Uuid::now_v7(), "analyst1", role)),
            )
            .body(Body::empty())
            .unwrap()
    }

    async fn seeded_router() -> Router {
        let state = make_state(setup_db().await);
        state.onboarding.insert_into_rds(SEED).await.unwrap();
        make_router(state)
    }

    #[tokio::test]
    async fn search_filters_datasets() {
        let router = seeded_router().await;
        let res = router
            .clone()
            .oneshot(get_as("/catalog/datasets?search=quarter", Role::Analyst))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["rows"].as_array().unwrap().len(), 1);

        let res = router
            .oneshot(get_as("/catalog/datasets?search=hr", Role::Analyst))
            .await
            .unwrap();
        assert!(body_json(res).await["rows"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fields_come_with_staging_preview() {
        let res = seeded_router()
            .await
            .oneshot(get_as("/catalog/datasets/fin/sales/fields", Role::Admin))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["fields"]["rows"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["staging_ddl"],
            "CREATE TABLE staging.fin_sales_orders (\nid NUMBER(38,0) PRIMARY KEY\n);"
        );
    }

    #[tokio::test]
    async fn developers_cannot_browse_catalog() {
        let res = seeded_router()
            .await
            .oneshot(get_as("/catalog/datasets", Role::Developer))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
