//! API integration tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use vshield_api::{create_router, ApiConfig, AppState};
use vshield_detector::{Detector, DetectorFactory, DetectorResult};
use vshield_media::{
    check_ffmpeg, FfmpegCommand, FfmpegFrameSampler, FfmpegRunner, Frame, FrameSampler,
    MediaResult, SamplingOptions,
};
use vshield_models::ModelId;

const BOUNDARY: &str = "vshield-test-boundary";

/// Detector that scores every frame the same.
struct ConstantDetector {
    model: ModelId,
    score: f32,
}

impl Detector for ConstantDetector {
    fn model(&self) -> &ModelId {
        &self.model
    }

    fn predict_frames(&self, frames: &[Frame]) -> DetectorResult<Vec<f32>> {
        Ok(vec![self.score; frames.len()])
    }
}

/// Factory that counts constructions, optionally taking a while for each.
#[derive(Default)]
struct CountingFactory {
    constructions: AtomicUsize,
    delay: Duration,
}

impl CountingFactory {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl DetectorFactory for CountingFactory {
    fn create(&self, model: &ModelId) -> DetectorResult<Arc<dyn Detector>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Arc::new(ConstantDetector {
            model: model.clone(),
            score: 0.75,
        }))
    }
}

/// Sampler that returns a fixed number of blank frames without decoding anything.
struct FakeSampler {
    frames: usize,
    calls: AtomicUsize,
}

impl FakeSampler {
    fn new(frames: usize) -> Self {
        Self {
            frames,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSampler for FakeSampler {
    async fn sample_frames(
        &self,
        _video_path: &Path,
        options: &SamplingOptions,
    ) -> MediaResult<Vec<Frame>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = options.resize;
        Ok(vec![Frame::new(width, height); self.frames.min(options.max_frames)])
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    upload_dir: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn new(factory: Arc<dyn DetectorFactory>, sampler: Arc<dyn FrameSampler>) -> Self {
        Self::with_config(ApiConfig::default(), factory, sampler)
    }

    fn with_config(
        config: ApiConfig,
        factory: Arc<dyn DetectorFactory>,
        sampler: Arc<dyn FrameSampler>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();

        let config = ApiConfig {
            upload_dir: upload_dir.clone(),
            model_names: vec!["model_a".to_string(), "model_b".to_string()],
            ..config
        };
        let state = AppState::with_components(config, factory, sampler).unwrap();
        let router = create_router(state.clone(), None);

        Self {
            router,
            state,
            upload_dir,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(self.router.clone(), request).await
    }

    fn uploads(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.upload_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

enum Part<'a> {
    File { filename: &'a str, data: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

fn analyze_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { filename, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

fn video(filename: &str) -> Part<'_> {
    Part::File {
        filename,
        data: b"not really a video",
    }
}

fn model(name: &str) -> Part<'_> {
    Part::Text {
        name: "model_name",
        value: name,
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(3)));

    let (status, body) = app.send(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_security_and_request_id_headers() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(3)));

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(3)));

    let (status, body) = app.send(get("/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/nope"));
}

#[tokio::test]
async fn test_successful_analysis() {
    let factory = Arc::new(CountingFactory::default());
    let sampler = Arc::new(FakeSampler::new(9));
    let app = TestApp::new(factory.clone(), sampler.clone());

    let (status, body) = app
        .send(analyze_request(&[video("my clip.MP4"), model("model_b")]))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["filename"], "my_clip.MP4");
    assert_eq!(body["model_used"], "model_b");
    assert_eq!(body["num_frames"], 9);
    assert_eq!(body["frame_scores"].as_array().unwrap().len(), 9);
    assert_eq!(body["aggregate"]["verdict"], "fake");
    assert_eq!(body["aggregate"]["fake_frame_ratio"], 1.0);

    let thumbnails = body["thumbnails"].as_array().unwrap();
    assert_eq!(thumbnails.len(), 6);
    for (i, thumb) in thumbnails.iter().enumerate() {
        assert_eq!(thumb["index"], i);
        assert_eq!(thumb["score"], 0.75);
        assert!(!thumb["img_b64"].as_str().unwrap().is_empty());
    }

    assert_eq!(sampler.calls(), 1);
    assert_eq!(factory.count(), 1);

    // Uploads are kept by default, under a random 8-hex-digit prefix
    let uploads = app.uploads();
    assert_eq!(uploads.len(), 1);
    let stored = uploads[0].file_name().unwrap().to_str().unwrap().to_string();
    let (prefix, name) = stored.split_once('_').unwrap();
    assert_eq!(prefix.len(), 8);
    assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(name, "my_clip.MP4");
    assert_eq!(std::fs::read(&uploads[0]).unwrap(), b"not really a video");
}

#[tokio::test]
async fn test_default_model_and_short_video() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(2)));

    let (status, body) = app.send(analyze_request(&[video("clip.webm")])).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["model_used"], "model_a");
    assert_eq!(body["num_frames"], 2);
    assert_eq!(body["thumbnails"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_file_part() {
    let factory = Arc::new(CountingFactory::default());
    let sampler = Arc::new(FakeSampler::new(3));
    let app = TestApp::new(factory.clone(), sampler.clone());

    let (status, body) = app.send(analyze_request(&[model("model_a")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no file part");
    assert!(app.uploads().is_empty());
    assert_eq!(sampler.calls(), 0);
    assert_eq!(factory.count(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_has_no_file_part() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(3)));

    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no file part");
}

#[tokio::test]
async fn test_file_field_without_filename_is_not_a_file() {
    let sampler = Arc::new(FakeSampler::new(3));
    let app = TestApp::new(Arc::new(CountingFactory::default()), sampler.clone());

    let (status, body) = app
        .send(analyze_request(&[Part::Text {
            name: "file",
            value: "x",
        }]))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no file part");
    assert!(app.uploads().is_empty());
    assert_eq!(sampler.calls(), 0);
}

#[tokio::test]
async fn test_truncated_multipart_body() {
    let sampler = Arc::new(FakeSampler::new(3));
    let app = TestApp::new(Arc::new(CountingFactory::default()), sampler.clone());

    // File part whose closing boundary never arrives
    let body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.mp4\"\r\n\
         Content-Type: application/octet-stream\r\n\r\npartial video bytes",
        BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no file part");
    assert!(app.uploads().is_empty());
    assert_eq!(sampler.calls(), 0);
}

#[tokio::test]
async fn test_empty_filename() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(3)));

    let (status, body) = app.send(analyze_request(&[video("")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no selected file");
    assert!(app.uploads().is_empty());
}

#[tokio::test]
async fn test_disallowed_extension() {
    let factory = Arc::new(CountingFactory::default());
    let sampler = Arc::new(FakeSampler::new(3));
    let app = TestApp::new(factory.clone(), sampler.clone());

    let (status, body) = app.send(analyze_request(&[video("notes.txt")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "allowed extensions: [mp4, mov, avi, mkv, webm]");
    assert!(app.uploads().is_empty());
    assert_eq!(sampler.calls(), 0);
    assert_eq!(factory.count(), 0);
    assert!(app.state.registry.loaded_models().is_empty());
}

#[tokio::test]
async fn test_unknown_model() {
    let factory = Arc::new(CountingFactory::default());
    let sampler = Arc::new(FakeSampler::new(3));
    let app = TestApp::new(factory.clone(), sampler.clone());

    let (status, body) = app
        .send(analyze_request(&[model("resnet"), video("clip.mp4")]))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "Unknown model 'resnet'. Available: [model_a, model_b]"
    );
    // Frames are sampled first; the name fails before any detector is built
    assert_eq!(sampler.calls(), 1);
    assert_eq!(factory.count(), 0);
    assert!(app.state.registry.loaded_models().is_empty());
}

#[tokio::test]
async fn test_no_frames_checked_before_model_name() {
    let factory = Arc::new(CountingFactory::default());
    let sampler = Arc::new(FakeSampler::new(0));
    let app = TestApp::new(factory.clone(), sampler.clone());

    let (status, body) = app
        .send(analyze_request(&[video("clip.mp4"), model("not_a_model")]))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no frames extracted");
    assert_eq!(sampler.calls(), 1);
    assert_eq!(factory.count(), 0);
    assert!(app.state.registry.loaded_models().is_empty());
}

#[tokio::test]
async fn test_no_frames_extracted() {
    let factory = Arc::new(CountingFactory::default());
    let app = TestApp::new(factory.clone(), Arc::new(FakeSampler::new(0)));

    let (status, body) = app.send(analyze_request(&[video("clip.mov")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no frames extracted");
    assert_eq!(factory.count(), 0);
}

#[tokio::test]
async fn test_missing_scores_give_null_thumbnail_scores() {
    let factory = |model: &ModelId| -> DetectorResult<Arc<dyn Detector>> {
        struct FirstFrameOnly(ModelId);

        impl Detector for FirstFrameOnly {
            fn model(&self) -> &ModelId {
                &self.0
            }

            fn predict_frames(&self, _frames: &[Frame]) -> DetectorResult<Vec<f32>> {
                Ok(vec![0.1])
            }
        }

        Ok(Arc::new(FirstFrameOnly(model.clone())))
    };
    let app = TestApp::new(Arc::new(factory), Arc::new(FakeSampler::new(3)));

    let (status, body) = app.send(analyze_request(&[video("clip.mp4")])).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["num_frames"], 3);
    let thumbnails = body["thumbnails"].as_array().unwrap();
    assert_eq!(thumbnails.len(), 3);
    assert!(thumbnails[0]["score"].is_number());
    assert!(thumbnails[1]["score"].is_null());
    assert!(thumbnails[2]["score"].is_null());
}

#[tokio::test]
async fn test_uploads_removed_when_not_retained() {
    let config = ApiConfig {
        retain_uploads: false,
        ..Default::default()
    };
    let app = TestApp::with_config(
        config,
        Arc::new(CountingFactory::default()),
        Arc::new(FakeSampler::new(4)),
    );

    let (status, _) = app.send(analyze_request(&[video("clip.mkv")])).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.uploads().is_empty());
}

#[tokio::test]
async fn test_sequential_requests_construct_detector_once() {
    let factory = Arc::new(CountingFactory::default());
    let app = TestApp::new(factory.clone(), Arc::new(FakeSampler::new(3)));

    for _ in 0..2 {
        let (status, _) = app
            .send(analyze_request(&[video("clip.mp4"), model("model_a")]))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(factory.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_construct_detector_once() {
    let factory = Arc::new(CountingFactory::with_delay(Duration::from_millis(200)));
    let app = TestApp::new(factory.clone(), Arc::new(FakeSampler::new(3)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let router = app.router.clone();
            tokio::spawn(async move {
                send(router, analyze_request(&[video("clip.mp4"), model("model_a")])).await
            })
        })
        .collect();

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "body: {}", body);
    }

    assert_eq!(factory.count(), 1);
}

#[tokio::test]
async fn test_models_endpoint_reports_loaded_models() {
    let app = TestApp::new(Arc::new(CountingFactory::default()), Arc::new(FakeSampler::new(3)));

    let (_, body) = app.send(get("/models")).await;
    assert_eq!(body["models"], serde_json::json!(["model_a", "model_b"]));
    assert_eq!(body["default"], "model_a");
    assert_eq!(body["loaded"], serde_json::json!([]));

    app.send(analyze_request(&[video("clip.mp4"), model("model_b")]))
        .await;

    let (status, body) = app.send(get("/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], serde_json::json!(["model_b"]));
}

#[tokio::test]
async fn test_body_limit() {
    let config = ApiConfig {
        max_body_size: 1024,
        ..Default::default()
    };
    let sampler = Arc::new(FakeSampler::new(3));
    let app = TestApp::with_config(config, Arc::new(CountingFactory::default()), sampler.clone());

    let data = vec![0u8; 4096];
    let request = analyze_request(&[Part::File {
        filename: "big.mp4",
        data: &data,
    }]);
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(sampler.calls(), 0);
}

#[tokio::test]
#[ignore = "requires ffmpeg on PATH"]
async fn test_end_to_end_synthetic_video() {
    check_ffmpeg().expect("ffmpeg must be on PATH for this test");

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("synthetic.mp4");
    // 2 seconds at 5 fps = 10 frames
    let generate = FfmpegCommand::new("testsrc=duration=2:size=64x64:rate=5", &source)
        .input_format("lavfi")
        .video_codec("mpeg4");
    FfmpegRunner::new().run(&generate).await.unwrap();
    let data = std::fs::read(&source).unwrap();

    let config = ApiConfig {
        sample_every_n: 1,
        max_frames: 5,
        ..Default::default()
    };
    let factory = Arc::new(CountingFactory::default());
    let app = TestApp::with_config(
        config,
        factory.clone(),
        Arc::new(FfmpegFrameSampler::new().with_timeout(60)),
    );

    let request = analyze_request(&[
        Part::File {
            filename: "synthetic.mp4",
            data: &data,
        },
        model("model_a"),
    ]);
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["num_frames"], 5);
    assert_eq!(body["frame_scores"].as_array().unwrap().len(), 5);
    assert!(body["thumbnails"].as_array().unwrap().len() <= 5);
    assert_eq!(body["model_used"], "model_a");
    assert_eq!(factory.count(), 1);
}
