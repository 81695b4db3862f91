//! End-to-end tests of the HTTP routes, driven in-process through the router.

#![cfg(feature = "server")]

use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgba, RgbaImage};
use tower::ServiceExt;

use sketchset::artifacts::Artifacts;
use sketchset::dataset::DatasetOptions;
use sketchset::dataset::npy::{NpyHeader, read_unicode};
use sketchset::label::LabelPair;
use sketchset::server::{AppState, router};
use sketchset::store::{Backend, SampleStore};

const BOUNDARY: &str = "sketchsetboundary";

fn png_data_url(width: u32, height: u32, pixel: [u8; 4]) -> String {
    let img = RgbaImage::from_pixel(width, height, Rgba(pixel));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner()))
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

fn form_request(shape: &str, color: &str, image: &str) -> Request<Body> {
    let body = format!(
        "poligono={}&color={}&myImage={}",
        urlencode(shape),
        urlencode(color),
        urlencode(image)
    );
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn multipart_request(shape: &str, color: &str, image: &str) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in [("poligono", shape), ("color", color), ("myImage", image)] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

struct Harness {
    _dir: tempfile::TempDir,
    app: Router,
    store: Arc<dyn SampleStore>,
}

impl Harness {
    fn new(backend: Backend) -> Self {
        Self::build(backend, |state| state)
    }

    fn with_upload_limit(backend: Backend, bytes: usize) -> Self {
        Self::build(backend, |state| state.with_max_upload_bytes(bytes))
    }

    fn build(backend: Backend, configure: impl FnOnce(AppState) -> AppState) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let store = sketchset::store::open(backend, &dir.path().join("data")).unwrap();
        let state = configure(AppState::new(
            Arc::clone(&store),
            Artifacts::new(dir.path().join("out")),
            DatasetOptions::default(),
        ));
        Self {
            app: router(state),
            store,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }
}

fn assert_redirect_home(status: StatusCode, headers: &axum::http::HeaderMap) {
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/");
}

#[tokio::test]
async fn index_serves_drawing_page() {
    let h = Harness::new(Backend::Bucket);
    let (status, headers, body) = h.send(get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let page = String::from_utf8(body).unwrap();
    assert!(page.contains("myCanvas"));
    assert!(page.contains("name=\"poligono\""));
}

#[tokio::test]
async fn red_and_blue_squares_export_in_upload_order() {
    let h = Harness::new(Backend::Relational);

    let (status, headers, _) = h
        .send(form_request("square", "red", &png_data_url(10, 10, [255, 0, 0, 255])))
        .await;
    assert_redirect_home(status, &headers);
    let (status, headers, _) = h
        .send(multipart_request("square", "blue", &png_data_url(10, 10, [0, 0, 255, 255])))
        .await;
    assert_redirect_home(status, &headers);

    let (status, _, body) = h.send(get("/prepare")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "OK! 2 samples");

    let (status, headers, x) = h.send(get("/X.npy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    let (header, offset) = NpyHeader::parse(&x).unwrap();
    assert_eq!(header.descr, "|u1");
    assert_eq!(header.shape, vec![2, 10, 10, 3]);
    let data = &x[offset..];
    assert_eq!(&data[..3], &[255, 0, 0]);
    assert_eq!(&data[300..303], &[0, 0, 255]);

    let (status, _, y) = h.send(get("/y.npy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read_unicode(&y).unwrap(), vec!["square_red", "square_blue"]);
}

#[tokio::test]
async fn malformed_upload_still_redirects_and_stores_nothing() {
    let h = Harness::new(Backend::Relational);
    let (status, headers, _) = h
        .send(form_request("square", "red", "data:image/png;base64,@@not base64@@"))
        .await;
    assert_redirect_home(status, &headers);
    assert!(h.store.index().unwrap().is_empty());
}

#[tokio::test]
async fn incomplete_form_still_redirects() {
    let h = Harness::new(Backend::Bucket);
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("poligono=square"))
        .unwrap();
    let (status, headers, _) = h.send(req).await;
    assert_redirect_home(status, &headers);
    assert!(h.store.index().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_upload_redirects_and_stores_nothing() {
    let h = Harness::with_upload_limit(Backend::Relational, 64);
    let image = png_data_url(10, 10, [255, 0, 0, 255]);
    assert!(image.len() > 64);

    let (status, headers, _) = h.send(form_request("square", "red", &image)).await;
    assert_redirect_home(status, &headers);
    let (status, headers, _) = h.send(multipart_request("square", "red", &image)).await;
    assert_redirect_home(status, &headers);
    assert!(h.store.index().unwrap().is_empty());

    let (status, _, _) = h
        .send(json_request(
            "/api/samples",
            serde_json::json!({ "shape": "square", "color": "red", "image": image }),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.store.index().unwrap().is_empty());
}

#[tokio::test]
async fn downloads_are_missing_until_prepared() {
    let h = Harness::new(Backend::Filesystem);
    let (status, _, _) = h.send(get("/X.npy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = h.send(get("/y.npy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_export_on_every_backend() {
    for backend in [Backend::Relational, Backend::Bucket, Backend::Filesystem] {
        let h = Harness::new(backend);
        let (status, _, body) = h.send(get("/prepare")).await;
        assert_eq!(status, StatusCode::OK, "{backend}");
        assert_eq!(String::from_utf8(body).unwrap(), "OK! 0 samples");

        let (_, _, x) = h.send(get("/X.npy")).await;
        assert_eq!(NpyHeader::parse(&x).unwrap().0.shape, vec![0, 200, 200, 3]);
        let (_, _, y) = h.send(get("/y.npy")).await;
        assert!(read_unicode(&y).unwrap().is_empty());
    }
}

#[tokio::test]
async fn repeated_prepare_is_byte_identical() {
    let h = Harness::new(Backend::Filesystem);
    h.send(form_request("bandera", "verde", &png_data_url(4, 4, [0, 170, 0, 255])))
        .await;
    h.send(form_request("bandera", "roja", &png_data_url(4, 4, [255, 0, 0, 255])))
        .await;

    h.send(get("/prepare")).await;
    let (_, _, x1) = h.send(get("/X.npy")).await;
    let (_, _, y1) = h.send(get("/y.npy")).await;
    h.send(get("/prepare")).await;
    let (_, _, x2) = h.send(get("/X.npy")).await;
    let (_, _, y2) = h.send(get("/y.npy")).await;
    assert_eq!(x1, x2);
    assert_eq!(y1, y2);
}

#[tokio::test]
async fn mismatched_canvas_sizes_fail_prepare() {
    let h = Harness::new(Backend::Relational);
    h.send(form_request("a", "x", &png_data_url(4, 4, [0, 0, 0, 255])))
        .await;
    h.send(form_request("b", "x", &png_data_url(5, 4, [0, 0, 0, 255])))
        .await;

    let (status, _, body) = h.send(get("/prepare")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body).unwrap().starts_with("error:"));
}

#[tokio::test]
async fn json_api_reports_failures() {
    let h = Harness::new(Backend::Bucket);

    let (status, _, body) = h
        .send(json_request(
            "/api/samples",
            serde_json::json!({
                "shape": "bandera",
                "color": "amarillá",
                "image": png_data_url(2, 2, [255, 215, 0, 255]),
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(
        created["id"]
            .as_str()
            .unwrap()
            .starts_with("bandera_amarilla/")
    );

    let (status, _, body) = h
        .send(json_request(
            "/api/samples",
            serde_json::json!({ "shape": "bandera", "color": "roja", "image": "!!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(err["error"].as_str().unwrap().contains("base64"));

    let (status, _, body) = h.send(get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["backend"], "bucket");
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["labels"][0]["label"], "bandera_amarilla");
    assert_eq!(stats["labels"][0]["count"], 1);
}

#[tokio::test]
async fn each_upload_adds_exactly_one_sample_to_its_label() {
    let h = Harness::new(Backend::Relational);
    let labels = LabelPair::new("bandera", "azul");
    for expected in 1..=3 {
        h.send(form_request("bandera", "azul", &png_data_url(3, 3, [0, 0, 255, 255])))
            .await;
        assert_eq!(h.store.index().unwrap().count_for(&labels), expected);
    }
    h.send(get("/prepare")).await;
    let (_, _, y) = h.send(get("/y.npy")).await;
    assert_eq!(read_unicode(&y).unwrap(), vec!["bandera_azul"; 3]);
}

#[tokio::test]
async fn health_reports_backend() {
    let h = Harness::new(Backend::Filesystem);
    let (status, _, body) = h.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["backend"], "filesystem");
}
