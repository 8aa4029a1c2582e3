use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{artifact_reference, FilterSelection, GenerateMapResponse, ResetMapsResponse};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ApiError, GenerationError};
use crate::AppState;

pub async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

/// `POST /api/generate-map`
///
/// Validates the selection, runs one generation job and places its artifact.
/// The process is never started for an invalid selection.
pub async fn generate_map(
    State(state): State<AppState>,
    payload: Result<Json<FilterSelection>, JsonRejection>,
) -> Result<Json<GenerateMapResponse>, ApiError> {
    let Json(selection) = payload.inspect_err(|rejection| {
        warn!("rejected generate-map body: {}", rejection.body_text());
    })?;
    if let Err(err) = selection.validate() {
        warn!("rejected generate-map request: {err}");
        return Err(err.into());
    }

    let job = Uuid::new_v4();
    let span = info_span!("generate_map", %job, resolution = %selection.resolution);
    run_job(&state, &selection)
        .instrument(span)
        .await
        .map(Json)
        .map_err(|err| {
            let api = ApiError::from(err);
            info!(status = %api.status(), "generate-map responded with an error");
            api
        })
}

async fn run_job(
    state: &AppState,
    selection: &FilterSelection,
) -> Result<GenerateMapResponse, GenerationError> {
    info!(years = ?selection.years, states = ?selection.states, "starting map generation");

    let artifact = state.generator.generate(selection).await.map_err(|err| {
        warn!("map generation failed: {err}");
        err
    })?;
    let file_name = state.store.place(&artifact).await.map_err(|err| {
        error!("artifact placement failed: {err}");
        err
    })?;

    let reference = artifact_reference(&file_name);
    info!(%reference, "map ready");
    Ok(GenerateMapResponse::placed(reference))
}

/// `DELETE /api/reset-maps`
pub async fn reset_maps(
    State(state): State<AppState>,
) -> Result<Json<ResetMapsResponse>, ApiError> {
    let removed = state.store.purge().await.map_err(|err| {
        error!("artifact cleanup failed: {err}");
        err
    })?;
    info!(removed, "artifact store purged");
    Ok(Json(ResetMapsResponse {
        message: "Maps reset successfully".to_string(),
        removed,
    }))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use pretty_assertions::assert_eq;
    use protocol::{ErrorResponse, GENERATE_MAP_PATH, RESET_MAPS_PATH};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::generator::{ArtifactLocation, BoxFuture, MapGenerator, ProcessGenerator};
    use crate::store::ArtifactStore;

    /// Returns a canned outcome and counts invocations.
    struct FakeGenerator {
        calls: AtomicUsize,
        outcome: Box<dyn Fn() -> Result<ArtifactLocation, GenerationError> + Send + Sync>,
    }

    impl FakeGenerator {
        fn new(
            outcome: impl Fn() -> Result<ArtifactLocation, GenerationError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: Box::new(outcome),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MapGenerator for FakeGenerator {
        fn generate<'a>(
            &'a self,
            _selection: &'a FilterSelection,
        ) -> BoxFuture<'a, Result<ArtifactLocation, GenerationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = (self.outcome)();
            Box::pin(async move { outcome })
        }
    }

    struct Harness {
        public: TempDir,
        state: AppState,
    }

    impl Harness {
        fn new(generator: Arc<dyn MapGenerator>) -> Result<Self> {
            let public = TempDir::new().context("public dir")?;
            let state = AppState {
                store: Arc::new(ArtifactStore::new(public.path().join("maps"))),
                generator,
            };
            Ok(Self { public, state })
        }

        fn maps_dir(&self) -> PathBuf {
            self.public.path().join("maps")
        }

        fn stored(&self) -> Vec<String> {
            list(&self.maps_dir())
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            body: Option<Value>,
        ) -> Result<(StatusCode, Value)> {
            let mut builder = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(v) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(v.to_string())
                }
                None => Body::empty(),
            };
            let request = builder.body(body).context("build request")?;
            let response = crate::build_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap_or_else(|err| match err {});
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .context("read response body")?;
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).context("parse JSON body")?
            };
            Ok((status, value))
        }
    }

    fn list(dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut out: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        out.sort();
        out
    }

    fn canned_error(code: &str) -> GenerationError {
        match code {
            "PROCESS_ERROR" => GenerationError::ProcessError("oops".to_string()),
            "EXIT_FAILURE" => GenerationError::ExitFailure(Some(1)),
            "MALFORMED_OUTPUT" => GenerationError::MalformedOutput("not json".to_string()),
            _ => GenerationError::Timeout(Duration::from_secs(1)),
        }
    }

    fn valid_body() -> Value {
        json!({ "resolution": "Postcode", "years": ["2023"], "states": ["Victoria"] })
    }

    #[tokio::test]
    async fn invalid_selections_are_rejected_before_generation() -> Result<()> {
        let generator = FakeGenerator::new(|| Ok(ArtifactLocation::new("/unused.html")));
        let h = Harness::new(generator.clone())?;

        let bodies = [
            json!({ "years": ["2023"], "states": ["Victoria"] }),
            json!({ "resolution": "", "years": ["2023"], "states": ["Victoria"] }),
            json!({ "resolution": "Postcode", "years": [], "states": ["Victoria"] }),
            json!({ "resolution": "Postcode", "years": ["2023"], "states": [] }),
            json!({ "resolution": "Postcode", "years": ["2023"], "states": null }),
            json!({}),
        ];
        for body in bodies {
            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(body)).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let err: ErrorResponse = serde_json::from_value(value)?;
            assert_eq!(err.error, "Missing required parameters");
            assert_eq!(err.code.as_deref(), Some("VALIDATION_ERROR"));
        }

        assert_eq!(generator.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_bad_request() -> Result<()> {
        let generator = FakeGenerator::new(|| Ok(ArtifactLocation::new("/unused.html")));
        let h = Harness::new(generator.clone())?;

        let (status, _) = h
            .send(Method::POST, GENERATE_MAP_PATH, Some(json!({ "years": "2023" })))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(generator.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn successful_generation_places_artifact() -> Result<()> {
        let work = TempDir::new()?;
        let source = work.path().join("map123.html");
        std::fs::write(&source, "<html></html>")?;
        let reported = source.clone();
        let generator = FakeGenerator::new(move || Ok(ArtifactLocation::new(reported.clone())));
        let h = Harness::new(generator.clone())?;

        let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "success": true, "htmlFilePath": "/maps/map123.html" }));
        assert_eq!(generator.calls(), 1);
        assert!(!source.exists());
        assert_eq!(h.stored(), vec!["map123.html".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn generation_errors_leave_store_unchanged() -> Result<()> {
        for code in ["PROCESS_ERROR", "EXIT_FAILURE", "MALFORMED_OUTPUT", "TIMEOUT"] {
            let generator = FakeGenerator::new(move || Err(canned_error(code)));
            let h = Harness::new(generator)?;
            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            let err: ErrorResponse = serde_json::from_value(value)?;
            assert_eq!(err.code.as_deref(), Some(code));
            assert!(!err.error.is_empty());
            assert!(h.stored().is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn vanished_artifact_is_a_placement_failure() -> Result<()> {
        let generator =
            FakeGenerator::new(|| Ok(ArtifactLocation::new("/nonexistent/dir/map.html")));
        let h = Harness::new(generator)?;

        let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let err: ErrorResponse = serde_json::from_value(value)?;
        assert_eq!(err.code.as_deref(), Some("ARTIFACT_PLACEMENT_FAILED"));
        assert!(h.stored().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn reset_purges_store() -> Result<()> {
        let generator = FakeGenerator::new(|| Ok(ArtifactLocation::new("/unused.html")));
        let h = Harness::new(generator)?;
        std::fs::create_dir_all(h.maps_dir())?;
        std::fs::write(h.maps_dir().join("old.html"), "old")?;

        let (status, value) = h.send(Method::DELETE, RESET_MAPS_PATH, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "message": "Maps reset successfully", "removed": 1 }));
        assert!(h.stored().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn reset_on_empty_store_succeeds() -> Result<()> {
        let generator = FakeGenerator::new(|| Ok(ArtifactLocation::new("/unused.html")));
        let h = Harness::new(generator)?;

        let (status, value) = h.send(Method::DELETE, RESET_MAPS_PATH, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["removed"], json!(0));
        Ok(())
    }

    #[tokio::test]
    async fn placed_artifact_is_servable() -> Result<()> {
        let work = TempDir::new()?;
        let source = work.path().join("served.html");
        std::fs::write(&source, "<html>served</html>")?;
        let reported = source.clone();
        let generator = FakeGenerator::new(move || Ok(ArtifactLocation::new(reported.clone())));
        let h = Harness::new(generator)?;

        let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
        assert_eq!(status, StatusCode::OK);
        let reference = value["htmlFilePath"].as_str().context("reference")?.to_string();

        let request = Request::builder().uri(&reference).body(Body::empty())?;
        let response = crate::build_router(h.state.clone())
            .oneshot(request)
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&bytes[..], b"<html>served</html>");
        Ok(())
    }

    #[tokio::test]
    async fn healthz_is_ok() -> Result<()> {
        let generator = FakeGenerator::new(|| Ok(ArtifactLocation::new("/unused.html")));
        let h = Harness::new(generator)?;
        let request = Request::builder().uri("/healthz").body(Body::empty())?;
        let response = crate::build_router(h.state.clone())
            .oneshot(request)
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[cfg(unix)]
    mod end_to_end {
        use pretty_assertions::assert_eq;

        use super::*;

        fn shell_generator(script: String) -> Arc<ProcessGenerator> {
            Arc::new(ProcessGenerator::new(
                "sh",
                vec!["-c".to_string(), script, "sh".to_string()],
                Duration::from_secs(10),
            ))
        }

        #[tokio::test]
        async fn real_process_success() -> Result<()> {
            let work = TempDir::new()?;
            let source = work.path().join("map123.html");
            let script = format!(
                "echo '<html></html>' > {p}; echo '{{\"map_html_path\":\"{p}\"}}'",
                p = source.display()
            );
            let h = Harness::new(shell_generator(script))?;

            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(value, json!({ "success": true, "htmlFilePath": "/maps/map123.html" }));
            assert!(!source.exists());
            assert_eq!(h.stored(), vec!["map123.html".to_string()]);
            Ok(())
        }

        #[tokio::test]
        async fn real_process_failure() -> Result<()> {
            let h = Harness::new(shell_generator("echo oops >&2; exit 1".to_string()))?;
            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(value["error"].as_str().unwrap_or_default().contains("oops"));
            assert!(h.stored().is_empty());
            Ok(())
        }

        #[tokio::test]
        async fn real_process_error_report_reaches_the_client() -> Result<()> {
            let script = r#"echo '{"error": "Invalid resolution. Must be one of [Postcode]", "details": {}}'; exit 1"#;
            let h = Harness::new(shell_generator(script.to_string()))?;
            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(value["code"], json!("PROCESS_ERROR"));
            let message = value["error"].as_str().unwrap_or_default();
            assert!(message.contains("Invalid resolution. Must be one of [Postcode]"), "{message}");
            assert!(h.stored().is_empty());
            Ok(())
        }

        #[tokio::test]
        async fn real_process_non_json_output() -> Result<()> {
            let h = Harness::new(shell_generator("echo 'Map saved!'; exit 0".to_string()))?;
            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(value["code"], json!("MALFORMED_OUTPUT"));
            assert!(h.stored().is_empty());
            Ok(())
        }

        /// Output on both channels plus a failing exit still produces a single
        /// response.
        #[tokio::test]
        async fn mixed_signals_resolve_once() -> Result<()> {
            let work = TempDir::new()?;
            let source = work.path().join("map.html");
            let script = format!(
                "echo x > {p}; echo '{{\"map_html_path\":\"{p}\"}}'; echo warn >&2; exit 2",
                p = source.display()
            );
            let h = Harness::new(shell_generator(script))?;
            let (status, value) = h.send(Method::POST, GENERATE_MAP_PATH, Some(valid_body())).await?;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(value["code"], json!("PROCESS_ERROR"));
            // Not placed, so the generator's file is left where it was.
            assert!(source.exists());
            assert!(h.stored().is_empty());
            Ok(())
        }
    }
}
