// Smoke test for the facade crate: core and session work through `pharos::`

use pharos::testing::{http_connection, response_body, response_start};
use pharos::{
    get, App, AsgiService, Connection, CookieBackend, CookieBackendConfig, HandlerOutput,
    ReturnKind, SessionConfig, SessionMiddleware,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_facade_end_to_end() {
    let backend = Arc::new(
        CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session"))).unwrap(),
    );
    let app = App::builder()
        .middleware(SessionMiddleware::factory(backend).unwrap())
        .handler(
            get("/ping")
                .returns(ReturnKind::Data)
                .build(|connection: Connection| async move {
                    connection.set_session_value("seen", json!(true));
                    Ok(HandlerOutput::Data(json!({"pong": true})))
                })
                .unwrap(),
        )
        .build()
        .unwrap();

    let (connection, log) = http_connection("GET", "/ping");
    app.call(connection).await.unwrap();

    assert_eq!(response_start(&log).unwrap().status, 200);
    assert_eq!(response_body(&log), br#"{"pong":true}"#.to_vec());
    assert!(response_start(&log)
        .unwrap()
        .headers
        .iter()
        .any(|(name, _)| name == b"set-cookie"));
}
