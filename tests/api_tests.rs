//! End-to-end HTTP tests against the fixture model and an on-disk SQLite store.

mod common;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use prediction_service::core::config::DuplicatePolicy;
use prediction_service::server;
use serde_json::{Value, json};

fn example_observation() -> Value {
    json!({
        "Age": 22.0,
        "Cabin": null,
        "Embarked": "S",
        "Fare": 7.25,
        "Parch": 0,
        "Pclass": 3,
        "Sex": "male",
        "SibSp": 1
    })
}

fn predict_body(id: i64, observation: Value) -> Value {
    json!({"id": id, "observation": observation})
}

macro_rules! init_app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.ctx.clone()))
                .app_data(server::json_config(64 * 1024))
                .configure(server::routes),
        )
        .await
    };
}

macro_rules! post_json {
    ($app:expr, $uri:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri($uri)
            .set_json($body)
            .to_request();
        let body: Value = test::call_and_read_body_json(&$app, req).await;
        body
    }};
}

#[actix_web::test]
async fn predict_scores_documented_example() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let body = post_json!(app, "/predict", predict_body(0, example_observation()));
    let proba = body["proba"].as_f64().expect("proba");
    assert!(
        (proba - common::EXAMPLE_PROBA).abs() < 1e-12,
        "unexpected probability {proba}"
    );
    assert!(body.get("error").is_none());
}

#[actix_web::test]
async fn predict_stores_submitted_observation_text() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let observation = r#"{"Sex":"male","Age":2.2e1, "Pclass":3,"Embarked":"S"}"#;
    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(("content-type", "application/json"))
        .set_payload(format!(r#"{{"id": 11, "observation": {observation}}}"#))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["proba"].is_f64());

    let stored = harness.ctx.store.get(11).expect("get").expect("row");
    assert_eq!(stored.observation, observation);
}

#[actix_web::test]
async fn duplicate_id_is_rejected_and_row_unchanged() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let first = post_json!(app, "/predict", predict_body(7, example_observation()));

    let mut changed = example_observation();
    changed["Sex"] = json!("female");
    let second = post_json!(app, "/predict", predict_body(7, changed));
    assert_eq!(
        second["error"],
        json!("Observation ID: \"7\" already exists")
    );
    let first_proba = first["proba"].as_f64().expect("proba");
    assert!(second["proba"].as_f64().expect("proba") > first_proba);

    let rows = harness.ctx.store.list().expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].proba, first_proba);
    assert!(rows[0].observation.contains("\"male\""));
}

#[actix_web::test]
async fn duplicate_id_overwrites_under_upsert_policy() {
    let harness = common::harness(DuplicatePolicy::Overwrite);
    let app = init_app!(harness);
    post_json!(app, "/predict", predict_body(7, example_observation()));

    let mut changed = example_observation();
    changed["Sex"] = json!("female");
    let second = post_json!(app, "/predict", predict_body(7, changed));
    assert!(second.get("error").is_none());

    let stored = harness.ctx.store.get(7).expect("get").expect("row");
    assert_eq!(stored.proba, second["proba"].as_f64().expect("proba"));
    assert!(stored.observation.contains("\"female\""));
}

#[actix_web::test]
async fn update_unknown_id_reports_error_without_creating_row() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let body = post_json!(app, "/update", json!({"id": 404, "true_class": 1}));
    assert_eq!(
        body,
        json!({"error": "Observation ID: \"404\" does not exist"})
    );
    assert!(harness.ctx.store.list().expect("list").is_empty());
}

#[actix_web::test]
async fn update_sets_and_overwrites_true_class() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let predicted = post_json!(app, "/predict", predict_body(3, example_observation()));

    let first = post_json!(app, "/update", json!({"id": 3, "true_class": 1}));
    assert_eq!(first["observation_id"], json!(3));
    assert_eq!(first["true_class"], json!(1));
    assert_eq!(first["proba"], predicted["proba"]);
    assert!(first["id"].is_i64());
    let raw = first["observation"].as_str().expect("observation");
    let stored: Value = serde_json::from_str(raw).expect("stored JSON");
    assert_eq!(stored, example_observation());

    let second = post_json!(app, "/update", json!({"id": 3, "true_class": 0}));
    assert_eq!(second["true_class"], json!(0));
    assert_eq!(second["id"], first["id"]);
}

#[actix_web::test]
async fn update_reply_carries_exactly_the_record_fields() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    post_json!(app, "/predict", predict_body(5, example_observation()));

    let body = post_json!(app, "/update", json!({"id": 5, "true_class": 0}));
    let mut keys: Vec<&str> = body
        .as_object()
        .expect("record object")
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    assert_eq!(
        keys.join(","),
        "id,observation,observation_id,proba,true_class"
    );
}

#[actix_web::test]
async fn missing_columns_still_score() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let body = post_json!(app, "/predict", predict_body(1, json!({"Sex": "female"})));
    let proba = body["proba"].as_f64().expect("proba");
    assert!((0.0..=1.0).contains(&proba));

    let body = post_json!(app, "/predict", json!({"id": 2}));
    assert!(body["proba"].is_f64());
}

#[actix_web::test]
async fn unknown_fields_do_not_change_the_score() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let plain = post_json!(app, "/predict", predict_body(1, example_observation()));

    let mut noisy = example_observation();
    noisy["Ticket"] = json!("A/5 21171");
    noisy["Name"] = json!("Braund, Mr. Owen Harris");
    let extra = post_json!(app, "/predict", predict_body(2, noisy));
    assert_eq!(plain, extra);
}

#[actix_web::test]
async fn list_db_contents_returns_rows_in_insert_order() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    for id in [30, 10, 20] {
        post_json!(app, "/predict", predict_body(id, example_observation()));
    }
    let req = test::TestRequest::get()
        .uri("/list-db-contents")
        .to_request();
    let rows: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    let ids: Vec<i64> = rows
        .iter()
        .map(|row| row["observation_id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids, vec![30, 10, 20]);
}

#[actix_web::test]
async fn malformed_body_is_a_json_400() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"observation\": {}}")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn health_reports_backend_and_fingerprint() {
    let harness = common::harness(DuplicatePolicy::Overwrite);
    let app = init_app!(harness);
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["backend"], json!("sqlite"));
    assert_eq!(body["duplicate_policy"], json!("overwrite"));
    assert_eq!(body["model_fingerprint"].as_str().map(str::len), Some(64));
    assert_eq!(body["columns"].as_array().map(Vec::len), Some(8));
}

#[actix_web::test]
async fn unknown_route_is_404_json() {
    let harness = common::harness(DuplicatePolicy::Reject);
    let app = init_app!(harness);
    let req = test::TestRequest::get().uri("/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
