//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`. Everything except `/api/health` passes
//! the actor middleware (outermost) and the access log (innermost).

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints::{coverage, health, schedule};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Build router from a pre-constructed `ApiContext` (e.g. one with a fixed clock).
pub fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route(
            "/prescriptions/:id/administrations",
            get(schedule::administrations),
        )
        .route(
            "/prescriptions/:id/smart-defaults",
            get(schedule::smart_defaults),
        )
        .route("/prescriptions/:id/schedule", post(schedule::configure))
        .route("/prescriptions/:id/discontinue", post(schedule::discontinue))
        .route("/administrations/:id/schedule", patch(schedule::adjust))
        .route(
            "/administrations/:id/adjustments",
            get(schedule::adjustments),
        )
        .route("/administrations/:id/record", post(schedule::record))
        .route("/plans/:id/coverage/calculate", post(coverage::calculate))
        .route("/plans/:id/coverage/import", post(coverage::import))
        .route("/plans/:id/coverage/template", get(coverage::template))
        .route("/plans/:id/coverage-rules", post(coverage::create_rule))
        .route("/coverage-rules", patch(coverage::bulk_update))
        .route(
            "/coverage-rules/:id",
            patch(coverage::update_rule).delete(coverage::delete_rule),
        )
        .route("/coverage-rules/:id/value", patch(coverage::quick_update))
        .route("/coverage-rules/:id/history", get(coverage::rule_history))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_actor));

    let public = Router::new()
        .route("/health", get(health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected.merge(public))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::authorization::RolePolicy;
    use crate::db::repository;
    use crate::models::enums::{AdministrationStatus, CoverageCategory};
    use crate::models::*;

    const NOW: &str = "2025-03-10 10:00:00";

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    /// Router over a temp database with the clock fixed at `NOW`.
    /// The tempdir guard must be kept alive for the duration of the test.
    fn test_app() -> (Router, Arc<CoreState>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::new(
            tmp.path().join("ward.db"),
            Arc::new(RolePolicy::default()),
        ));
        let ctx = ApiContext::with_clock(core.clone(), || ts(NOW));
        (api_router_with_ctx(ctx), core, tmp)
    }

    fn seed_prescription(core: &CoreState, frequency: &str) -> Uuid {
        let conn = core.open_db().unwrap();
        let rx = Prescription {
            id: Uuid::new_v4(),
            admission_id: Uuid::new_v4(),
            drug_name: "Metronidazole 500mg".into(),
            frequency: frequency.into(),
            duration: "5 days".into(),
            dose_quantity: "1 tab".into(),
            schedule_pattern: None,
            discontinuation: None,
            created_at: ts("2025-03-10 08:00:00"),
        };
        repository::insert_prescription(&conn, &rx).unwrap();
        rx.id
    }

    fn seed_plan(core: &CoreState) -> Uuid {
        let conn = core.open_db().unwrap();
        let plan = InsurancePlan {
            id: Uuid::new_v4(),
            name: "Staff Scheme".into(),
            consultation_default: None,
            drugs_default: Some(90.0),
            labs_default: None,
            procedures_default: None,
        };
        repository::insert_plan(&conn, &plan).unwrap();
        repository::upsert_catalog_item(&conn, &CatalogItem {
            category: CoverageCategory::Drug,
            item_code: "MTZ500".into(),
            item_name: "Metronidazole 500mg".into(),
            current_price: 1.25,
        })
        .unwrap();
        plan.id
    }

    fn request(method: &str, uri: &str, role: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder
                .header("X-Actor-Id", format!("{role}-1"))
                .header("X-Actor-Role", role);
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_actor() {
        let (app, _core, _tmp) = test_app();
        let response = app.oneshot(request("GET", "/api/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], true);
    }

    #[tokio::test]
    async fn missing_actor_returns_401() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "BID");
        let uri = format!("/api/prescriptions/{rx_id}/administrations");
        let response = app.oneshot(request("GET", &uri, None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn billing_cannot_configure_schedule() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "BID");
        let uri = format!("/api/prescriptions/{rx_id}/schedule");
        let body = serde_json::json!({"schedule_pattern": {"day_1": ["10:30"], "subsequent": ["06:00", "18:00"]}});
        let response = app.oneshot(request("POST", &uri, Some("billing"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let conn = core.open_db().unwrap();
        assert!(repository::get_administrations_for_prescription(&conn, &rx_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn configure_then_list_schedule() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "BID");

        let uri = format!("/api/prescriptions/{rx_id}/schedule");
        let body = serde_json::json!({
            "schedule_pattern": {"day_1": ["10:30", "18:00"], "subsequent": ["06:00", "18:00"]}
        });
        let response = app.clone().oneshot(request("POST", &uri, Some("nurse"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["administrations"].as_array().unwrap().len(), 10);
        assert_eq!(json["frequency"], "twice_daily");

        let uri = format!("/api/prescriptions/{rx_id}/administrations");
        let response = app.oneshot(request("GET", &uri, Some("pharmacist"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["administrations"][0]["scheduled_time"], "2025-03-10T10:30:00");
    }

    #[tokio::test]
    async fn malformed_pattern_reports_field() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "BID");
        let uri = format!("/api/prescriptions/{rx_id}/schedule");
        let body = serde_json::json!({"schedule_pattern": {"day_1": ["25:00"], "subsequent": ["06:00"]}});
        let response = app.oneshot(request("POST", &uri, Some("doctor"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert!(json["error"]["field"].as_str().unwrap().starts_with("schedule_pattern.day_1"));
    }

    #[tokio::test]
    async fn smart_defaults_for_prescription() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "TDS");
        let uri = format!("/api/prescriptions/{rx_id}/smart-defaults");
        let response = app.oneshot(request("GET", &uri, Some("nurse"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["frequency"], "three_times_daily");
        assert_eq!(json["schedule_pattern"]["day_1"], serde_json::json!(["14:00", "22:00"]));
    }

    #[tokio::test]
    async fn unknown_prescription_is_404_and_bad_id_is_400() {
        let (app, _core, _tmp) = test_app();
        let uri = format!("/api/prescriptions/{}/smart-defaults", Uuid::new_v4());
        let response = app.clone().oneshot(request("GET", &uri, Some("nurse"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request("GET", "/api/prescriptions/not-a-uuid/smart-defaults", Some("nurse"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn adjust_and_record_flow() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "BID");
        let uri = format!("/api/prescriptions/{rx_id}/schedule");
        let body = serde_json::json!({"schedule_pattern": {"day_1": ["10:30", "18:00"], "subsequent": ["06:00", "18:00"]}});
        app.clone().oneshot(request("POST", &uri, Some("nurse"), Some(body))).await.unwrap();

        let admin_id = {
            let conn = core.open_db().unwrap();
            repository::get_administrations_for_prescription(&conn, &rx_id).unwrap()[0].id
        };

        let uri = format!("/api/administrations/{admin_id}/schedule");
        let body = serde_json::json!({"scheduled_time": "2025-03-10T11:15:00", "reason": "Patient in theatre"});
        let response = app.clone().oneshot(request("PATCH", &uri, Some("nurse"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["is_adjusted"], true);

        let uri = format!("/api/administrations/{admin_id}/adjustments");
        let response = app.clone().oneshot(request("GET", &uri, Some("nurse"), None)).await.unwrap();
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        let uri = format!("/api/administrations/{admin_id}/record");
        let body = serde_json::json!({"status": "held", "notes": "short"});
        let response = app.clone().oneshot(request("POST", &uri, Some("nurse"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = serde_json::json!({"status": "given", "dosage_given": "1 tab"});
        let response = app.clone().oneshot(request("POST", &uri, Some("nurse"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // A given dose can no longer be moved
        let uri = format!("/api/administrations/{admin_id}/schedule");
        let body = serde_json::json!({"scheduled_time": "2025-03-10T12:00:00"});
        let response = app.oneshot(request("PATCH", &uri, Some("nurse"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let conn = core.open_db().unwrap();
        let admin = repository::get_administration(&conn, &admin_id).unwrap().unwrap();
        assert_eq!(admin.status, AdministrationStatus::Given);
    }

    #[tokio::test]
    async fn discontinue_rejects_short_reason_then_cancels() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "BID");
        let uri = format!("/api/prescriptions/{rx_id}/schedule");
        let body = serde_json::json!({"schedule_pattern": {"day_1": ["10:30", "18:00"], "subsequent": ["06:00", "18:00"]}});
        app.clone().oneshot(request("POST", &uri, Some("doctor"), Some(body))).await.unwrap();

        let uri = format!("/api/prescriptions/{rx_id}/discontinue");
        let response = app
            .clone()
            .oneshot(request("POST", &uri, Some("doctor"), Some(serde_json::json!({"reason": "stop"}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = serde_json::json!({"reason": "Culture shows resistance, switching agent"});
        let response = app.clone().oneshot(request("POST", &uri, Some("doctor"), Some(body.clone()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["cancelled"], 10);

        let response = app.oneshot(request("POST", &uri, Some("doctor"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn prn_schedule_is_conflict() {
        let (app, core, _tmp) = test_app();
        let rx_id = seed_prescription(&core, "PRN");
        let uri = format!("/api/prescriptions/{rx_id}/schedule");
        let response = app
            .oneshot(request("POST", &uri, Some("doctor"), Some(serde_json::json!({}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn calculate_uses_plan_default() {
        let (app, core, _tmp) = test_app();
        let plan_id = seed_plan(&core);
        let uri = format!("/api/plans/{plan_id}/coverage/calculate");
        let body = serde_json::json!({"category": "drug", "item_code": "MTZ500", "amount": 1.25, "quantity": 4, "date": "2025-03-10"});
        let response = app.oneshot(request("POST", &uri, Some("pharmacist"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["rule_kind"], "plan_default");
        assert_eq!(json["subtotal"], 5.0);
        assert_eq!(json["insurer_amount"], 4.5);
        assert_eq!(json["patient_amount"], 0.5);
    }

    #[tokio::test]
    async fn rule_lifecycle_over_http() {
        let (app, core, _tmp) = test_app();
        let plan_id = seed_plan(&core);

        let uri = format!("/api/plans/{plan_id}/coverage-rules");
        let body = serde_json::json!({"category": "drug", "item_code": "MTZ500", "coverage_type": "percentage", "coverage_value": 60});
        let response = app.clone().oneshot(request("POST", &uri, Some("billing"), Some(body.clone()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let rule_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = app.clone().oneshot(request("POST", &uri, Some("billing"), Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let uri = format!("/api/coverage-rules/{rule_id}/value");
        let response = app
            .clone()
            .oneshot(request("PATCH", &uri, Some("billing"), Some(serde_json::json!({"coverage_value": 70}))))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["patient_copay_percentage"], 30.0);

        let uri = format!("/api/coverage-rules/{rule_id}");
        let response = app.clone().oneshot(request("DELETE", &uri, Some("billing"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let uri = format!("/api/coverage-rules/{rule_id}/history");
        let response = app.oneshot(request("GET", &uri, Some("billing"), None)).await.unwrap();
        let history = json_body(response).await;
        let actions: Vec<_> = history.as_array().unwrap().iter().map(|h| h["action"].clone()).collect();
        assert_eq!(actions, vec!["deleted", "updated", "created"]);
    }

    #[tokio::test]
    async fn import_preview_and_template() {
        let (app, core, _tmp) = test_app();
        let plan_id = seed_plan(&core);
        let csv = "item_code,coverage_type,coverage_value\nMTZ500,fixed_amount,1\nBOGUS,full,\n";

        let uri = format!("/api/plans/{plan_id}/coverage/import?category=drug&preview=true");
        let req = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("X-Actor-Id", "b-1")
            .header("X-Actor-Role", "billing")
            .header("Content-Type", "text/csv")
            .body(Body::from(csv))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let preview = json_body(response).await;
        assert_eq!(preview["valid_rows"].as_array().unwrap().len(), 1);
        assert_eq!(preview["errors"][0]["row"], 3);

        let uri = format!("/api/plans/{plan_id}/coverage/import?category=drug");
        let req = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("X-Actor-Id", "b-1")
            .header("X-Actor-Role", "billing")
            .body(Body::from(csv))
            .unwrap();
        let summary = json_body(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(summary["created"], 1);
        assert_eq!(summary["skipped"], 1);

        let uri = format!("/api/plans/{plan_id}/coverage/template?category=drug");
        let response = app.oneshot(request("GET", &uri, Some("billing"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["Content-Type"].to_str().unwrap().starts_with("text/csv"));
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("MTZ500,Metronidazole 500mg,1.25,fixed_amount,1,"));
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let (app, _core, _tmp) = test_app();
        let response = app
            .oneshot(request("GET", "/api/nonexistent", Some("admin"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
