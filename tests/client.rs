use cloudsigma_api_client::{
    ApiClientError, ClientConfig, ClientRegistry, GenericClient, LoginMethod, NormalizedResponse,
    QueryParams, RawResponse, RecordedRequest, ResponseHook, RestApi,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{
    basic_auth, body_json, body_partial_json, header, header_exists, header_regex, method, path,
    query_param,
};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// The blocking client owns its own runtime, so it has to live and die on a
/// blocking thread.
async fn blocking<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

fn endpoint(server: &MockServer) -> String {
    format!("{}/api/2.0", server.uri())
}

fn basic_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(endpoint(server), "user@example.com", "pass")
}

fn session_config(server: &MockServer) -> ClientConfig {
    basic_config(server).with_login_method(LoginMethod::Session)
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/2.0/accounts/action/"))
        .and(query_param("do", "login"))
        .and(body_partial_json(json!({"username": "user@example.com", "password": "pass"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "csrftoken=tok123; Path=/")
                .set_body_json(json!({"uuid": "acc-1"})),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn no_authorization(req: &Request) -> bool {
    !req.headers.contains_key("authorization")
}

#[tokio::test(flavor = "multi_thread")]
async fn basic_get_unwraps_single_item_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/servers/"))
        .and(query_param("limit", "0"))
        .and(basic_auth("user@example.com", "pass"))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", "CloudSigma turlo client"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"meta": {"total_count": 1}, "objects": [{"uuid": "s1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = basic_config(&server);
    let result = blocking(move || {
        let mut client = GenericClient::new(config)?;
        let mut query = QueryParams::new();
        query.insert("limit", "0".to_string());
        client.get("servers/", Some(&query), false)
    })
    .await
    .unwrap();

    assert_eq!(result, NormalizedResponse::Single(json!({"uuid": "s1"})));
}

#[tokio::test(flavor = "multi_thread")]
async fn get_with_return_list_keeps_sequence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/drives/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": [{"uuid": "d1"}]})))
        .mount(&server)
        .await;

    let config = basic_config(&server);
    let result = blocking(move || GenericClient::new(config)?.get("/drives", None, true))
        .await
        .unwrap();

    assert_eq!(result, NormalizedResponse::List(vec![json!({"uuid": "d1"})]));
}

#[tokio::test(flavor = "multi_thread")]
async fn post_sends_json_body_and_returns_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/drives/"))
        .and(body_json(json!({"objects": [{"name": "d1", "size": 1024}]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "objects": [{"uuid": "d1"}, {"uuid": "d2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = basic_config(&server);
    let result = blocking(move || {
        let mut client = GenericClient::new(config)?;
        let data = json!({"objects": [{"name": "d1", "size": 1024}]});
        client.post("drives/", &data, None, false)
    })
    .await
    .unwrap();

    assert_eq!(
        result,
        NormalizedResponse::List(vec![json!({"uuid": "d1"}), json!({"uuid": "d2"})])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn put_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/2.0/servers/s1/"))
        .and(body_json(json!({"name": "renamed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "s1", "name": "renamed"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/2.0/servers/s1/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = basic_config(&server);
    let (updated, deleted, last_status) = blocking(move || {
        let mut client = GenericClient::new(config)?;
        let updated = client.put("servers/s1", &json!({"name": "renamed"}), None, false)?;
        let deleted = client.delete("servers/s1/", None)?;
        let last_status = client.last_response().map(|r| r.status);
        Ok::<_, ApiClientError>((updated, deleted, last_status))
    })
    .await
    .unwrap();

    assert_eq!(updated.as_single().unwrap()["name"], "renamed");
    assert!(deleted.is_empty());
    assert_eq!(last_status, Some(StatusCode::NO_CONTENT));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_collection_is_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/servers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
        .mount(&server)
        .await;

    let config = basic_config(&server);
    let result = blocking(move || GenericClient::new(config)?.get("servers/", None, false))
        .await
        .unwrap();

    assert_eq!(result, NormalizedResponse::List(Vec::new()));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_codes_map_to_classified_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/unauthorized/"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("X-REQUEST-ID", "req-401")
                .set_body_string("bad credentials"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/forbidden/"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("X-REQUEST-ID", "req-403")
                .set_body_string(r#"[{"error_message": "forbidden"}]"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/missing/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/broken/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let config = basic_config(&server);
    let errors = blocking(move || {
        let mut client = GenericClient::new(config).unwrap();
        ["unauthorized", "forbidden", "missing", "broken"]
            .into_iter()
            .map(|p| client.get(p, None, false).unwrap_err())
            .collect::<Vec<_>>()
    })
    .await;

    assert!(matches!(&errors[0], ApiClientError::Auth { .. }));
    assert_eq!(errors[0].request_id(), Some("req-401"));
    assert_eq!(errors[0].body(), None);

    assert!(matches!(&errors[1], ApiClientError::Permission { .. }));
    assert_eq!(errors[1].request_id(), Some("req-403"));
    assert_eq!(errors[1].body(), Some(r#"[{"error_message": "forbidden"}]"#));

    assert!(matches!(&errors[2], ApiClientError::Client { .. }));
    assert_eq!(errors[2].status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(errors[2].request_id(), None);
    assert_eq!(errors[2].body(), Some("not found"));

    assert!(matches!(&errors[3], ApiClientError::Server { .. }));
    assert_eq!(errors[3].body(), Some("boom"));
}

#[tokio::test(flavor = "multi_thread")]
async fn session_login_primes_csrf_and_cookies() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let referer = format!("{}/api/2.0/", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/2.0/servers/"))
        .and(header("x-csrftoken", "tok123"))
        .and(header("referer", referer.as_str()))
        .and(header_regex("cookie", "csrftoken=tok123"))
        .and(no_authorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
        .expect(2)
        .mount(&server)
        .await;

    let config = session_config(&server);
    let (first, second, method) = blocking(move || {
        let mut client = GenericClient::new(config)?;
        let first = client.get("servers/", None, false)?;
        let second = client.get("servers/", None, false)?;
        Ok::<_, ApiClientError>((first, second, client.login_method()))
    })
    .await
    .unwrap();

    assert_eq!(first, NormalizedResponse::List(Vec::new()));
    assert_eq!(first, second);
    assert_eq!(method, LoginMethod::Session);
}

#[tokio::test(flavor = "multi_thread")]
async fn session_with_secret_sends_otp_on_login_and_every_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/accounts/action/"))
        .and(query_param("do", "login"))
        .and(|req: &Request| {
            serde_json::from_slice::<Value>(&req.body)
                .ok()
                .and_then(|body| body.get("otp").and_then(Value::as_str).map(str::len))
                == Some(6)
        })
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "csrftoken=tok123; Path=/")
                .set_body_json(json!({})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/servers/s1/action/"))
        .and(query_param("do", "start"))
        .and(header("x-csrftoken", "tok123"))
        .and(header_regex("otp", r"^\d{6}$"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"action": "start", "result": "success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/servers/s1/"))
        .and(header_exists("otp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "s1"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = session_config(&server).with_secret("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
    let (started, fetched) = blocking(move || {
        let mut client = GenericClient::new(config)?;
        let mut query = QueryParams::new();
        query.insert("do", "start".to_string());
        let started = client.post("servers/s1/action/", &json!({}), Some(&query), false)?;
        let fetched = client.get("servers/s1", None, false)?;
        Ok::<_, ApiClientError>((started, fetched))
    })
    .await
    .unwrap();

    assert_eq!(started.as_single().unwrap()["result"], "success");
    assert_eq!(fetched, NormalizedResponse::Single(json!({"uuid": "s1"})));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_login_fails_construction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/accounts/action/"))
        .respond_with(ResponseTemplate::new(401).insert_header("X-REQUEST-ID", "login-1"))
        .expect(1)
        .mount(&server)
        .await;

    let config = session_config(&server);
    let err = blocking(move || GenericClient::new(config).err()).await.unwrap();

    assert!(matches!(err, ApiClientError::Auth { .. }));
    assert_eq!(err.request_id(), Some("login-1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn login_without_csrf_cookie_fails_construction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/accounts/action/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let config = session_config(&server);
    let err = blocking(move || GenericClient::new(config).err()).await.unwrap();

    assert!(matches!(err, ApiClientError::MissingCsrfToken));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_login_method_sends_no_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/public/"))
        .and(no_authorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let config = basic_config(&server).with_login_method(LoginMethod::None);
    let result = blocking(move || GenericClient::new(config)?.get("public", None, false))
        .await
        .unwrap();

    assert_eq!(result, NormalizedResponse::Single(json!({"ok": true})));
}

#[tokio::test(flavor = "multi_thread")]
async fn response_hook_sees_every_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/servers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/drives/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let hook: Arc<dyn ResponseHook> = Arc::new(move |req: &RecordedRequest, resp: &RawResponse| {
        recorder
            .lock()
            .unwrap()
            .push((req.method.to_string(), req.path_url.clone(), resp.status.as_u16()));
    });

    let config = basic_config(&server).with_request_log_level("debug");
    blocking(move || {
        let mut client = GenericClient::new(config).unwrap();
        client.set_response_hook(hook);
        client.get("servers", None, false).unwrap();
        client.get("drives", None, false).unwrap_err();
    })
    .await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("GET".to_string(), "/api/2.0/servers/".to_string(), 200),
            ("GET".to_string(), "/api/2.0/drives/".to_string(), 500),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_builds_generic_client_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/balance/"))
        .and(basic_auth("user@example.com", "pass"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": "10.00"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = basic_config(&server).with_client("generic");
    let result = blocking(move || {
        let mut client = ClientRegistry::with_defaults().create(config)?;
        client.get("balance/", None, false)
    })
    .await
    .unwrap();

    assert_eq!(result.into_value(), json!({"balance": "10.00"}));
}

#[tokio::test(flavor = "multi_thread")]
async fn sub_second_timeout_still_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/servers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = basic_config(&server).with_timeout(std::time::Duration::from_millis(500));
    let result = blocking(move || GenericClient::new(config)?.get("servers/", None, false))
        .await
        .unwrap();

    assert_eq!(result, NormalizedResponse::List(Vec::new()));
}
