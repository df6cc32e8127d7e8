// End-to-end session middleware flow through a built application

use pharos_core::asgi::Scope;
use pharos_core::testing::{connection_for, response_body, response_start, MessageLog};
use pharos_core::{get, App, AsgiService, Connection, HandlerOutput, ReturnKind};
use pharos_session::{
    CookieBackend, CookieBackendConfig, MemoryStorage, ServerSideBackend, ServerSideConfig,
    SessionConfig, SessionMiddleware,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn test_app(backend: Arc<dyn pharos_session::SessionBackend>) -> App {
    App::builder()
        .middleware(SessionMiddleware::factory(backend).unwrap())
        .handler(
            get("/set")
                .returns(ReturnKind::Data)
                .build(|connection: Connection| async move {
                    connection.set_session_value("user", json!("alice"));
                    Ok(HandlerOutput::Data(json!({"ok": true})))
                })
                .unwrap(),
        )
        .handler(
            get("/read")
                .returns(ReturnKind::Data)
                .build(|connection: Connection| async move {
                    Ok(HandlerOutput::Data(
                        connection.session_value("user").unwrap_or(Value::Null),
                    ))
                })
                .unwrap(),
        )
        .handler(
            get("/skip")
                .opt("skip_session", json!(true))
                .returns(ReturnKind::Data)
                .build(|connection: Connection| async move {
                    Ok(HandlerOutput::Data(json!({
                        "has_session": connection.session_cell().is_some()
                    })))
                })
                .unwrap(),
        )
        .build()
        .unwrap()
}

/// Cookies issued on the response start message, as `name=value` pairs.
fn issued_cookies(log: &MessageLog) -> Vec<(String, String)> {
    let start = response_start(log).expect("no response start recorded");
    start
        .headers
        .iter()
        .filter(|(name, _)| name == b"set-cookie")
        .map(|(_, value)| String::from_utf8_lossy(value).to_string())
        .filter(|header| !header.contains("Max-Age=0"))
        .map(|header| {
            let pair = header.split(';').next().unwrap().to_string();
            let (name, value) = pair.split_once('=').unwrap();
            (name.to_string(), value.to_string())
        })
        .collect()
}

fn request_with_cookies(path: &str, cookies: &[(String, String)]) -> (Connection, MessageLog) {
    let mut scope = Scope::http("GET", path);
    if !cookies.is_empty() {
        let header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        scope.headers.insert("cookie".to_string(), header);
    }
    connection_for(scope)
}

#[tokio::test]
async fn test_cookie_backend_round_trip_through_app() {
    let backend = Arc::new(
        CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session"))).unwrap(),
    );
    let app = test_app(backend);

    // first request writes the session; the response sets the cookie
    let (connection, log) = request_with_cookies("/set", &[]);
    app.call(connection).await.unwrap();
    let cookies = issued_cookies(&log);
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].0, "session");

    // second request carries the cookie back and reads the session
    let (connection, log) = request_with_cookies("/read", &cookies);
    app.call(connection).await.unwrap();
    assert_eq!(response_body(&log), br#""alice""#.to_vec());
}

#[tokio::test]
async fn test_server_side_backend_round_trip_through_app() {
    let storage = Arc::new(MemoryStorage::new());
    let backend = Arc::new(
        ServerSideBackend::new(
            ServerSideConfig::new(SessionConfig::new("session")),
            storage.clone(),
        )
        .unwrap(),
    );
    let app = test_app(backend);

    let (connection, log) = request_with_cookies("/set", &[]);
    app.call(connection).await.unwrap();
    let cookies = issued_cookies(&log);
    assert_eq!(cookies.len(), 1, "expected a single session id cookie");
    let (_, session_id) = &cookies[0];

    // the data lives server-side under the issued id
    use pharos_session::SessionStorage;
    let stored = storage.get(session_id).await.unwrap();
    assert!(stored.is_some());

    let (connection, log) = request_with_cookies("/read", &cookies);
    app.call(connection).await.unwrap();
    assert_eq!(response_body(&log), br#""alice""#.to_vec());
}

#[tokio::test]
async fn test_session_persisted_only_on_response_start() {
    let backend = Arc::new(
        CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session"))).unwrap(),
    );
    let app = test_app(backend);

    let (connection, log) = request_with_cookies("/set", &[]);
    app.call(connection).await.unwrap();

    let messages = log.lock().clone();
    assert_eq!(messages.len(), 2);
    // only the start message carries cookies; the body frame is untouched
    match &messages[1] {
        pharos_core::Message::ResponseBody(frame) => {
            assert_eq!(frame.body, br#"{"ok":true}"#.to_vec());
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn test_exclude_opt_key_bypasses_middleware() {
    let backend = Arc::new(
        CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session"))).unwrap(),
    );
    let app = test_app(backend);

    let (connection, log) = request_with_cookies("/skip", &[]);
    app.call(connection).await.unwrap();

    assert_eq!(response_body(&log), br#"{"has_session":false}"#.to_vec());
    assert!(issued_cookies(&log).is_empty());
}

#[tokio::test]
async fn test_exclude_pattern_bypasses_middleware() {
    let backend = Arc::new(
        CookieBackend::new(CookieBackendConfig::new(
            SessionConfig::new("session").with_exclude(vec!["^/read".to_string()]),
        ))
        .unwrap(),
    );
    let app = test_app(backend);

    let (connection, log) = request_with_cookies("/read", &[]);
    app.call(connection).await.unwrap();

    // bypassed: no session installed, handler sees no value
    assert_eq!(response_body(&log), b"null".to_vec());
    assert!(issued_cookies(&log).is_empty());
}

#[tokio::test]
async fn test_clearing_session_expires_cookie() {
    let backend = Arc::new(
        CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session"))).unwrap(),
    );
    let app = App::builder()
        .middleware(SessionMiddleware::factory(backend).unwrap())
        .handler(
            get("/logout")
                .returns(ReturnKind::Data)
                .build(|connection: Connection| async move {
                    if let Some(cell) = connection.session_cell() {
                        cell.lock().clear();
                    }
                    Ok(HandlerOutput::Data(json!({"ok": true})))
                })
                .unwrap(),
        )
        .build()
        .unwrap();

    let existing = vec![("session".to_string(), "stale-payload".to_string())];
    let (connection, log) = request_with_cookies("/logout", &existing);
    app.call(connection).await.unwrap();

    let start = response_start(&log).unwrap();
    let cleared: Vec<String> = start
        .headers
        .iter()
        .filter(|(name, _)| name == b"set-cookie")
        .map(|(_, value)| String::from_utf8_lossy(value).to_string())
        .collect();
    assert_eq!(cleared.len(), 1);
    assert!(cleared[0].starts_with("session=null"));
    assert!(cleared[0].contains("Max-Age=0"));
}
