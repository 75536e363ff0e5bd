pub mod machines;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/machines", post(machines::create_machine))
        // `/machines/{name}` must match every machine name, `list` included.
        .route("/machines:list", post(machines::list_machines))
        .route("/machines/{name}", delete(machines::delete_machine))
        .route("/machines/{name}/status", post(machines::machine_status))
        .route("/machines/{name}/shutdown", post(machines::shutdown_machine))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(authed)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use http_body_util::BodyExt;
    use mcm_kubevirt::{Credentials, Error, MachineDriver, MachineSpec};
    use mockall::mock;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;

    mock! {
        Driver {}

        #[async_trait]
        impl MachineDriver for Driver {
            async fn create_machine(
                &self,
                name: &str,
                spec: &MachineSpec,
                credentials: &Credentials,
            ) -> mcm_kubevirt::Result<String>;
            async fn delete_machine(
                &self,
                name: &str,
                credentials: &Credentials,
            ) -> mcm_kubevirt::Result<String>;
            async fn get_machine_status(
                &self,
                name: &str,
                credentials: &Credentials,
            ) -> mcm_kubevirt::Result<String>;
            async fn list_machines(
                &self,
                spec: &MachineSpec,
                credentials: &Credentials,
            ) -> mcm_kubevirt::Result<BTreeMap<String, String>>;
            async fn shutdown_machine(
                &self,
                name: &str,
                credentials: &Credentials,
            ) -> mcm_kubevirt::Result<String>;
        }
    }

    fn app(driver: MockDriver, api_token: Option<&str>) -> Router {
        api_router(AppState {
            driver: Arc::new(driver),
            config: AppConfig {
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                api_token: api_token.map(str::to_string),
                shutdown_retry_attempts: None,
            },
        })
    }

    fn secret() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": "kubevirt-credentials" },
            "data": {
                "kubeconfig": STANDARD.encode("apiVersion: v1\nkind: Config\n"),
                "userData": STANDARD.encode("#cloud-config\n"),
            }
        })
    }

    fn provider_spec() -> Value {
        json!({
            "sourceURL": "https://images.example.com/ubuntu.img",
            "storageClassName": "standard",
            "pvcSize": "10Gi",
            "resources": { "requests": { "memory": "4Gi" } }
        })
    }

    fn request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn healthz_is_open_even_with_a_token() {
        let response = app(MockDriver::new(), Some("t0ken"))
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_returns_provider_id() {
        let mut driver = MockDriver::new();
        driver
            .expect_create_machine()
            .withf(|name, spec, creds| {
                name == "worker-0"
                    && spec.storage_class_name == "standard"
                    && creds.user_data() == "#cloud-config\n"
            })
            .times(1)
            .returning(|name, _, _| Ok(format!("kubevirt://{name}")));

        let (status, body) = send(
            app(driver, None),
            request(
                "POST",
                "/machines",
                json!({ "machineName": "worker-0", "providerSpec": provider_spec(), "secret": secret() }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "providerId": "kubevirt://worker-0" }));
    }

    #[tokio::test]
    async fn create_rejects_invalid_spec_before_calling_driver() {
        let (status, body) = send(
            app(MockDriver::new(), None),
            request(
                "POST",
                "/machines",
                json!({ "machineName": "worker-0", "providerSpec": {}, "secret": secret() }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("sourceURL is required"));
    }

    #[tokio::test]
    async fn missing_user_data_is_a_bad_request() {
        let mut secret = secret();
        secret["data"].as_object_mut().unwrap().remove("userData");

        let (status, body) = send(
            app(MockDriver::new(), None),
            request("POST", "/machines/worker-0/status", json!({ "secret": secret })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("userData"));
    }

    #[tokio::test]
    async fn unknown_machine_is_not_found() {
        let mut driver = MockDriver::new();
        driver
            .expect_get_machine_status()
            .withf(|name, _| name == "ghost")
            .returning(|name, _| {
                Err(Error::MachineNotFound {
                    name: name.to_string(),
                })
            });

        let (status, _) = send(
            app(driver, None),
            request("POST", "/machines/ghost/status", json!({ "secret": secret() })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_and_shutdown_route_to_the_driver() {
        let mut driver = MockDriver::new();
        driver
            .expect_delete_machine()
            .times(1)
            .returning(|_, _| Ok(String::new()));
        driver
            .expect_shutdown_machine()
            .times(1)
            .returning(|name, _| Ok(format!("kubevirt://{name}")));
        let app = app(driver, None);

        let (status, body) = send(
            app.clone(),
            request("DELETE", "/machines/gone", json!({ "secret": secret() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providerId"], "");

        let (status, body) = send(
            app,
            request("POST", "/machines/worker-1/shutdown", json!({ "secret": secret() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providerId"], "kubevirt://worker-1");
    }

    #[tokio::test]
    async fn list_passes_tags_through() {
        let mut driver = MockDriver::new();
        driver
            .expect_list_machines()
            .withf(|spec, _| spec.tags.get("role").map(String::as_str) == Some("worker"))
            .returning(|_, _| {
                Ok(BTreeMap::from([(
                    "kubevirt://worker-0".to_string(),
                    "worker-0".to_string(),
                )]))
            });

        let (status, body) = send(
            app(driver, None),
            request(
                "POST",
                "/machines:list",
                json!({ "providerSpec": { "tags": { "role": "worker" } }, "secret": secret() }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["machines"]["kubevirt://worker-0"], "worker-0");
    }

    #[tokio::test]
    async fn machine_named_list_is_routed_by_name() {
        let mut driver = MockDriver::new();
        driver
            .expect_delete_machine()
            .withf(|name, _| name == "list")
            .times(1)
            .returning(|name, _| Ok(format!("kubevirt://{name}")));
        driver
            .expect_get_machine_status()
            .withf(|name, _| name == "list")
            .times(1)
            .returning(|name, _| Ok(format!("kubevirt://{name}")));
        driver.expect_list_machines().never();
        let app = app(driver, None);

        let (status, body) = send(
            app.clone(),
            request("DELETE", "/machines/list", json!({ "secret": secret() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providerId"], "kubevirt://list");

        let (status, body) = send(
            app,
            request("POST", "/machines/list/status", json!({ "secret": secret() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providerId"], "kubevirt://list");
    }

    #[tokio::test]
    async fn token_is_enforced_when_configured() {
        let (status, _) = send(
            app(MockDriver::new(), Some("t0ken")),
            request("POST", "/machines/worker-0/status", json!({ "secret": secret() })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut driver = MockDriver::new();
        driver
            .expect_get_machine_status()
            .returning(|name, _| Ok(format!("kubevirt://{name}")));
        let mut req = request("POST", "/machines/worker-0/status", json!({ "secret": secret() }));
        req.headers_mut()
            .insert("authorization", "Bearer t0ken".parse().unwrap());

        let (status, _) = send(app(driver, Some("t0ken")), req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn remote_failures_are_bad_gateway() {
        let mut driver = MockDriver::new();
        driver
            .expect_shutdown_machine()
            .returning(|_, _| Err(Error::Client("connection refused".into())));

        let (status, body) = send(
            app(driver, None),
            request("POST", "/machines/worker-0/shutdown", json!({ "secret": secret() })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }
}
