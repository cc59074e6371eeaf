mod config;
mod error;
mod services;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use clap::Parser;
use config::ServerArgs;
use joblib::JobEngine;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = ServerArgs::parse();
    init_tracing(args.debug);
    serve(args).await
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "jobrunner=debug,joblib=debug,tower_http=debug"
    } else {
        "jobrunner=info,joblib=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = JobEngine::spawn(args.engine_config()).await?;
    let app = build_app(engine, args.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    if args.command_prefix.is_empty() {
        tracing::info!(addr = %args.addr, "listening");
    } else {
        tracing::info!(addr = %args.addr, fixed_command = ?args.command_prefix, "listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

fn build_app(engine: JobEngine, max_body_bytes: usize) -> Router {
    services::jobservice::router(engine)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, Response, StatusCode};
    use http_body_util::BodyExt;
    use joblib::EngineConfig;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_app(root: &std::path::Path, base_url: &str) -> Router {
        let engine = JobEngine::spawn(EngineConfig {
            jobs_dir: root.join("jobs"),
            staging_dir: root.join("staging"),
            base_url: base_url.into(),
            ..EngineConfig::default()
        })
        .await
        .expect("engine start");
        build_app(engine, 1024 * 1024)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: impl Into<Body>) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get(app: &Router, uri: &str) -> Response<Body> {
        send(app, Method::GET, uri, Body::empty()).await
    }

    async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    async fn submit(app: &Router, body: &'static [u8]) -> Value {
        let response = send(app, Method::POST, "/jobs", Body::from(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    async fn wait_for_status(app: &Router, id: &str, wanted: &str) -> Value {
        let poll = async {
            loop {
                let response = get(app, &format!("/jobs/{}/status", id)).await;
                if response.status() == StatusCode::OK {
                    let record = body_json(response).await;
                    if record["status"] == wanted {
                        return record;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), poll)
            .await
            .expect("job did not reach the expected status")
    }

    #[tokio::test]
    async fn echo_job_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;

        let created = submit(&app, br#"{"args":["echo","hi"]}"#).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status_url"], format!("/jobs/{}/status", id));
        assert_eq!(created["result_url"], format!("/jobs/{}/result", id));
        assert_eq!(created["log_url"], format!("/jobs/{}/log", id));

        let record = wait_for_status(&app, &id, "COMPLETED").await;
        assert_eq!(record["args"], serde_json::json!(["echo", "hi"]));
        assert!(record.get("pid").is_none());

        let result = get(&app, &format!("/jobs/{}/result", id)).await;
        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(
            result.headers()[axum::http::header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_bytes(result).await, b"hi\n");

        let log = get(&app, &format!("/jobs/{}/log", id)).await;
        assert_eq!(log.status(), StatusCode::OK);
        assert!(body_bytes(log).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_submission_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;

        let response = send(&app, Method::POST, "/jobs", "{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");

        let response = send(&app, Method::POST, "/jobs", r#"{"args":[]}"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let list = body_json(get(&app, "/jobs").await).await;
        assert_eq!(list, serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_jobs_are_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;
        let id = uuid::Uuid::new_v4();

        for endpoint in ["status", "result", "log"] {
            let response = get(&app, &format!("/jobs/{}/{}", id, endpoint)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", endpoint);
            let response = get(&app, &format!("/jobs/not-a-uuid/{}", endpoint)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", endpoint);
        }
    }

    #[tokio::test]
    async fn cancel_always_answers_200() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;
        let uri = format!("/jobs/{}/cancel", uuid::Uuid::new_v4());
        assert_eq!(send(&app, Method::PUT, &uri, Body::empty()).await.status(), StatusCode::OK);
        let response = send(&app, Method::PUT, "/jobs/garbage/cancel", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn canceled_job_has_no_result() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;

        let created = submit(&app, br#"{"args":["sleep","30"]}"#).await;
        let id = created["id"].as_str().unwrap().to_string();
        let running = wait_for_status(&app, &id, "IN_PROGRESS").await;
        assert!(running["pid"].is_u64());

        let result = get(&app, &format!("/jobs/{}/result", id)).await;
        assert_eq!(result.status(), StatusCode::NOT_FOUND);

        let cancel = send(&app, Method::PUT, &format!("/jobs/{}/cancel", id), Body::empty()).await;
        assert_eq!(cancel.status(), StatusCode::OK);
        wait_for_status(&app, &id, "CANCELED").await;

        let result = get(&app, &format!("/jobs/{}/result", id)).await;
        assert_eq!(result.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trailing_body_is_stdin_and_mime_type_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;

        let created = submit(&app, b"{\"args\":[\"cat\"],\"mime_type\":\"application/json\"}\n{\"k\":1}").await;
        let id = created["id"].as_str().unwrap().to_string();
        wait_for_status(&app, &id, "COMPLETED").await;

        let result = get(&app, &format!("/jobs/{}/result", id)).await;
        assert_eq!(
            result.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(body_bytes(result).await, b"{\"k\":1}");
    }

    #[tokio::test]
    async fn mime_type_that_cannot_be_a_header_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;

        let body: &'static [u8] = b"{\"args\":[\"echo\",\"hi\"],\"mime_type\":\"text/plain\\nX: y\"}";
        let response = send(&app, Method::POST, "/jobs", Body::from(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(get(&app, "/jobs").await).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn stored_unusable_mime_type_falls_back_to_text() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;

        let store = joblib::store::MetadataStore::open(dir.path().join("jobs"))
            .await
            .unwrap();
        let id = uuid::Uuid::new_v4();
        let record: joblib::JobRecord = serde_json::from_value(serde_json::json!({
            "id": id,
            "args": ["echo", "hi"],
            "mime_type": "text/plain\nX: y",
            "status": "COMPLETED",
            "enqueued_at": "2024-01-01T00:00:00Z",
            "started_at": "2024-01-01T00:00:01Z",
            "completed_at": "2024-01-01T00:00:02Z",
        }))
        .unwrap();
        store.create(&record).await.unwrap();
        tokio::fs::write(store.stdout_path(id), b"hi\n").await.unwrap();

        let result = get(&app, &format!("/jobs/{}/result", id)).await;
        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(
            result.headers()[axum::http::header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_bytes(result).await, b"hi\n");
    }

    #[tokio::test]
    async fn list_uses_base_url_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "https://runner.example").await;

        let first = submit(&app, br#"{"args":["true"]}"#).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = submit(&app, br#"{"args":["false"]}"#).await;
        assert_eq!(
            second["status_url"],
            format!("https://runner.example/jobs/{}/status", second["id"].as_str().unwrap())
        );

        let response = get(&app, "/jobs").await;
        assert_eq!(response.status(), StatusCode::OK);
        let list = body_json(response).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], second["id"]);
        assert_eq!(list[1]["id"], first["id"]);
        assert_eq!(list[0]["args"], serde_json::json!(["false"]));
        assert_eq!(list[0]["result_url"], second["result_url"]);
        assert_eq!(list[0]["log_url"], second["log_url"]);
        assert!(list[0]["enqueued_at"].is_string());
        assert!(list[0]["status"].is_string());
    }

    #[tokio::test]
    async fn health_reports_running_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "").await;
        let response = get(&app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["running_jobs"], 0);
    }
}
