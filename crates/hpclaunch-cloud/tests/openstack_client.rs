//! OpenStack client against a local fake of Keystone and Nova.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use hpclaunch_cloud::{AuthOptions, BootVolume, CloudApi, CloudError, OpenStackCloud, ServerCreate};

const TOKEN: &str = "tok-123";

#[derive(Clone)]
struct Fake {
    base: String,
    last_create: Arc<Mutex<Option<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-auth-token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

async fn issue_token(State(fake): State<Fake>, Json(body): Json<Value>) -> impl IntoResponse {
    let password = body["auth"]["identity"]["password"]["user"]["password"].as_str();
    if password != Some("secret") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": 401, "message": "The request you have made requires authentication."}})),
        )
            .into_response();
    }

    let catalog = json!({
        "token": {
            "catalog": [{
                "type": "compute",
                "endpoints": [{
                    "interface": "public",
                    "region_id": "nz-por-1",
                    "region": "nz-por-1",
                    "url": format!("{}/compute/v2.1/proj", fake.base),
                }]
            }]
        }
    });
    (StatusCode::CREATED, [("X-Subject-Token", TOKEN)], Json(catalog)).into_response()
}

async fn list_flavors(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "flavors": [
            { "id": "1", "name": "c1.c1r1", "links": [] },
            { "id": "2", "name": "c1.c2r4", "links": [] }
        ]
    }))
    .into_response()
}

async fn create_server(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    *fake.last_create.lock().unwrap() = Some(body);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "server": { "id": "srv-1", "links": [] } })),
    )
        .into_response()
}

async fn get_server(Path(id): Path<String>) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "itemNotFound": { "code": 404, "message": format!("Instance {id} could not be found.") } })),
    )
}

async fn delete_server() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn start_fake() -> Fake {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let fake = Fake {
        base: format!("http://{addr}"),
        last_create: Arc::new(Mutex::new(None)),
    };

    let app = Router::new()
        .route("/identity/v3/auth/tokens", post(issue_token))
        .route("/compute/v2.1/proj/flavors", get(list_flavors))
        .route("/compute/v2.1/proj/servers", post(create_server))
        .route(
            "/compute/v2.1/proj/servers/{id}",
            get(get_server).delete(delete_server),
        )
        .with_state(fake.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    fake
}

fn options(fake: &Fake, password: &str) -> AuthOptions {
    AuthOptions {
        auth_url: format!("{}/identity", fake.base),
        username: "ops".into(),
        password: password.into(),
        project_name: "hpc".into(),
        user_domain_name: "Default".into(),
        project_domain_name: "Default".into(),
        cacert: None,
        insecure: false,
    }
}

#[tokio::test]
async fn authenticates_and_lists_flavors() {
    let fake = start_fake().await;
    let cloud = OpenStackCloud::connect(&options(&fake, "secret")).await.unwrap();

    let flavors = cloud.list_flavors("nz-por-1").await.unwrap();
    let names: Vec<_> = flavors.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["c1.c1r1", "c1.c2r4"]);
}

#[tokio::test]
async fn wrong_password_is_an_auth_error() {
    let fake = start_fake().await;
    let err = OpenStackCloud::connect(&options(&fake, "nope"))
        .await
        .err()
        .expect("auth should fail");

    assert!(matches!(err, CloudError::Auth(_)));
    assert!(err.to_string().contains("requires authentication"));
}

#[tokio::test]
async fn region_without_endpoint_fails_before_any_request() {
    let fake = start_fake().await;
    let cloud = OpenStackCloud::connect(&options(&fake, "secret")).await.unwrap();

    let err = cloud.list_flavors("nz-hlz-1").await.unwrap_err();
    assert!(matches!(err, CloudError::EndpointNotFound { .. }));
}

#[tokio::test]
async fn create_server_sends_boot_volume_hint_and_user_data() {
    let fake = start_fake().await;
    let cloud = OpenStackCloud::connect(&options(&fake, "secret")).await.unwrap();

    let request = ServerCreate {
        name: "instance-4".into(),
        image_id: "img".into(),
        flavor_id: "1".into(),
        network_id: "net".into(),
        key_name: "ops".into(),
        boot_volume: BootVolume {
            image_id: "img".into(),
            size_gb: 40,
            delete_on_termination: true,
        },
        group_id: "grp-9".into(),
        user_data: Some(b"#cloud-config\n".to_vec()),
    };
    let server = cloud.create_server("nz-por-1", &request).await.unwrap();
    assert_eq!(server.id, "srv-1");
    assert_eq!(server.name, "instance-4");

    let body = fake.last_create.lock().unwrap().clone().unwrap();
    assert_eq!(body["os:scheduler_hints"]["group"], "grp-9");
    assert_eq!(body["server"]["networks"][0]["uuid"], "net");
    assert_eq!(body["server"]["block_device_mapping_v2"][0]["volume_size"], 40);
    assert_eq!(body["server"]["user_data"], "I2Nsb3VkLWNvbmZpZwo=");
}

#[tokio::test]
async fn api_errors_carry_status_and_message() {
    let fake = start_fake().await;
    let cloud = OpenStackCloud::connect(&options(&fake, "secret")).await.unwrap();

    let err = cloud.get_server("nz-por-1", "srv-404").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        err.to_string(),
        "provider returned 404: Instance srv-404 could not be found."
    );

    cloud.delete_server("nz-por-1", "srv-1").await.unwrap();
}
