//! Integration tests for the annotation server routes
//!
//! Tests cover:
//! - Health endpoint (no auth required)
//! - Basic authentication
//! - Home, help and completion pages
//! - Next-image redirects and annotation submission
//! - Image assets and static files
//! - Accept-Language negotiation

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use rotulador::i18n::Translations;
use rotulador::{build_router, AppState};
use rotulador_common::db::{connect_in_memory, AnnotationRepository, ImageRepository};
use rotulador_common::hash::hash_bytes;
use rotulador_common::ProjectConfig;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

const PROJECT: &str = r#"
meta:
  description: Pets <and> people
auth:
  alice:
    password: wonderland
  bob:
    password: builder
tasks:
  - id: quality
    name: Image quality
    classes:
      good: { name: Good }
      bad: { name: Bad }
  - id: person
    name: Is there a person?
    type: boolean
  - id: age
    name: Age group
    if:
      person: "true"
    classes:
      adult: { name: Adult }
      child: { name: Child }
"#;

/// PNG signature plus a distinguishing byte
fn png(tag: u8) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0, 0, 0, 0x0D, b'I', b'H', b'D', b'R', tag]);
    bytes
}

struct TestApp {
    app: Router,
    db: SqlitePool,
    images_dir: TempDir,
    /// Image hashes in snapshot (sha256) order
    images: Vec<String>,
}

/// Test helper: two registered images, English default
async fn setup_app() -> TestApp {
    let db = connect_in_memory().await.expect("Should create database");
    let images_dir = tempfile::tempdir().unwrap();
    let repo = ImageRepository::new(db.clone());

    let mut images = Vec::new();
    for tag in [1u8, 2] {
        let bytes = png(tag);
        let sha256 = hash_bytes(&bytes);
        let filename = format!("{}.png", sha256);
        std::fs::write(images_dir.path().join(&filename), &bytes).unwrap();
        repo.create(&sha256, &filename).await.unwrap();
        images.push(sha256);
    }
    images.sort();

    let config = ProjectConfig::from_yaml_str(PROJECT).unwrap();
    let translations = Translations::load("en").unwrap();
    let state = AppState::new(
        db.clone(),
        config,
        images_dir.path().to_path_buf(),
        translations,
    );

    TestApp {
        app: build_router(state),
        db,
        images_dir,
        images,
    }
}

fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

/// Test helper: authenticated GET as alice
fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth("alice", "wonderland"))
        .body(Body::empty())
        .unwrap()
}

/// Test helper: authenticated form POST, optionally from htmx
fn post_form(uri: &str, user: &str, password: &str, form: &str, htmx: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth(user, password))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if htmx {
        builder = builder.header("HX-Request", "true");
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn hx_redirect(response: &Response) -> String {
    response
        .headers()
        .get("HX-Redirect")
        .expect("HX-Redirect header")
        .to_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Health and static files (public)
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let t = setup_app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = send(&t.app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rotulador");
    assert!(body["version"].is_string());
    assert_eq!(body["tasks"], 3);
}

#[tokio::test]
async fn test_stylesheet_is_public() {
    let t = setup_app().await;
    let request = Request::builder()
        .uri("/static/style.css")
        .body(Body::empty())
        .unwrap();
    let response = send(&t.app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/css"));
}

#[tokio::test]
async fn test_shortcut_script_is_public() {
    let t = setup_app().await;
    let request = Request::builder()
        .uri("/static/annotate.js")
        .body(Body::empty())
        .unwrap();
    let response = send(&t.app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .contains("javascript"));
    assert!(body_text(response).await.contains("data-key"));
}

#[tokio::test]
async fn test_health_degraded_without_database() {
    let t = setup_app().await;
    t.db.close().await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = send(&t.app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "degraded");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_pages_require_auth() {
    let t = setup_app().await;
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = send(&t.app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        r#"Basic realm="restricted", charset="UTF-8""#
    );
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_rejected() {
    let t = setup_app().await;
    for (user, password) in [("alice", "nope"), ("mallory", "wonderland")] {
        let request = Request::builder()
            .uri("/help")
            .header(header::AUTHORIZATION, basic_auth(user, password))
            .body(Body::empty())
            .unwrap();
        let response = send(&t.app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", user);
    }
}

#[tokio::test]
async fn test_assets_require_auth() {
    let t = setup_app().await;
    let request = Request::builder()
        .uri(format!("/asset/{}", t.images[0]))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&t.app, request).await.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Pages
// =============================================================================

#[tokio::test]
async fn test_home_page_escapes_description() {
    let t = setup_app().await;
    let response = send(&t.app, get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Welcome to rotulador"));
    assert!(html.contains("Pets &lt;and&gt; people"));
    assert!(html.contains(r#"href="/annotate""#));
}

#[tokio::test]
async fn test_home_page_localized() {
    let t = setup_app().await;
    let mut request = get("/");
    request
        .headers_mut()
        .insert(header::ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9".parse().unwrap());
    let html = body_text(send(&t.app, request).await).await;

    assert!(html.contains("Bem-vindo ao rotulador"));
    assert!(html.contains(r#"<html lang="pt-BR">"#));
}

#[tokio::test]
async fn test_help_lists_tasks_in_order() {
    let t = setup_app().await;
    let response = send(&t.app, get("/help")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    let quality = html.find("Image quality").unwrap();
    let person = html.find("Is there a person?").unwrap();
    let age = html.find("Age group").unwrap();
    assert!(quality < person && person < age);
    assert!(html.contains("0 of 2 done, 2 left"));
    assert!(html.contains("0 of 0 done, 0 left"));
}

#[tokio::test]
async fn test_help_for_task() {
    let t = setup_app().await;
    let response = send(&t.app, get("/help/person")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Is there a person?"));
    assert!(html.contains("Yes"));
    assert!(html.contains("/annotate?task=person"));
}

#[tokio::test]
async fn test_help_for_unknown_task_is_404() {
    let t = setup_app().await;
    let response = send(&t.app, get("/help/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Annotation flow
// =============================================================================

#[tokio::test]
async fn test_annotate_redirects_to_next_image() {
    let t = setup_app().await;
    let response = send(&t.app, get("/annotate?task=quality")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let image = location.strip_prefix("/annotate/quality/").unwrap();
    assert!(t.images.contains(&image.to_string()));
}

#[tokio::test]
async fn test_annotate_without_task_starts_with_first_task() {
    let t = setup_app().await;
    let response = send(&t.app, get("/annotate")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("/annotate/quality/"));
}

#[tokio::test]
async fn test_annotate_unknown_task_is_404() {
    let t = setup_app().await;
    let response = send(&t.app, get("/annotate?task=nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_annotation_form() {
    let t = setup_app().await;
    let response = send(&t.app, get(&format!("/annotate/quality/{}", t.images[0]))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(&format!(r#"src="/asset/{}""#, t.images[0])));
    // Classes sorted by id with keys 1, 2
    let bad = html.find(r#"value="bad" data-key="1""#).unwrap();
    let good = html.find(r#"value="good" data-key="2""#).unwrap();
    assert!(bad < good);
    assert!(html.contains(r#"name="sure""#));
}

#[tokio::test]
async fn test_annotation_form_unknown_task_or_image_is_404() {
    let t = setup_app().await;
    let unknown_task = send(&t.app, get(&format!("/annotate/nope/{}", t.images[0]))).await;
    assert_eq!(unknown_task.status(), StatusCode::NOT_FOUND);

    let unknown_image = send(&t.app, get(&format!("/annotate/quality/{}", "f".repeat(64)))).await;
    assert_eq!(unknown_image.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_validation() {
    let t = setup_app().await;
    let uri = format!("/annotate/quality/{}", t.images[0]);

    let missing_sure = send(&t.app, post_form(&uri, "alice", "wonderland", "selectedClass=good", true)).await;
    assert_eq!(missing_sure.status(), StatusCode::BAD_REQUEST);

    let missing_class = send(&t.app, post_form(&uri, "alice", "wonderland", "sure=on", true)).await;
    assert_eq!(missing_class.status(), StatusCode::BAD_REQUEST);

    let unknown_class = send(
        &t.app,
        post_form(&uri, "alice", "wonderland", "selectedClass=great&sure=on", true),
    )
    .await;
    assert_eq!(unknown_class.status(), StatusCode::BAD_REQUEST);

    let unknown_image = send(
        &t.app,
        post_form(
            &format!("/annotate/quality/{}", "0".repeat(64)),
            "alice",
            "wonderland",
            "selectedClass=good&sure=on",
            true,
        ),
    )
    .await;
    assert_eq!(unknown_image.status(), StatusCode::NOT_FOUND);

    let unknown_task = send(
        &t.app,
        post_form(
            &format!("/annotate/colour/{}", t.images[0]),
            "alice",
            "wonderland",
            "selectedClass=good&sure=on",
            true,
        ),
    )
    .await;
    assert_eq!(unknown_task.status(), StatusCode::NOT_FOUND);

    let stats = AnnotationRepository::new(t.db.clone()).stats().await.unwrap();
    assert_eq!(stats.total_annotations, 0);
}

#[tokio::test]
async fn test_submit_records_authenticated_user() {
    let t = setup_app().await;
    let uri = format!("/annotate/quality/{}", t.images[0]);
    let response = send(
        &t.app,
        post_form(&uri, "bob", "builder", "sure=off&selectedClass=bad", true),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = AnnotationRepository::new(t.db.clone())
        .get(&t.images[0], "bob", 0)
        .await
        .unwrap()
        .expect("annotation stored for bob");
    assert_eq!(stored.option_value, "bad");
    assert!(!stored.sure);
}

#[tokio::test]
async fn test_full_pipeline_redirects() {
    let t = setup_app().await;
    let (first, second) = (&t.images[0], &t.images[1]);
    let submit = |task: &str, image: &str, class: &str| {
        post_form(
            &format!("/annotate/{}/{}", task, image),
            "alice",
            "wonderland",
            &format!("selectedClass={}&sure=off&sure=on", class),
            true,
        )
    };

    // Same task still has work
    let r = send(&t.app, submit("quality", first, "good")).await;
    assert_eq!(hx_redirect(&r), format!("/annotate/quality/{}", second));

    // Task finished: help page of the next task
    let r = send(&t.app, submit("quality", second, "bad")).await;
    assert_eq!(hx_redirect(&r), "/help/person");

    let r = send(&t.app, submit("person", first, "true")).await;
    assert_eq!(hx_redirect(&r), format!("/annotate/person/{}", second));

    // Only the first image becomes eligible for age
    let r = send(&t.app, submit("person", second, "false")).await;
    assert_eq!(hx_redirect(&r), "/help/age");

    let r = send(&t.app, submit("age", first, "adult")).await;
    assert_eq!(hx_redirect(&r), "/");

    // Nothing left: completion page instead of a redirect
    let response = send(&t.app, get("/annotate")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("All annotations are done!"));

    let help = body_text(send(&t.app, get("/help")).await).await;
    assert!(help.contains("1 of 1 done, 0 left"));
}

#[tokio::test]
async fn test_plain_form_post_gets_see_other() {
    let t = setup_app().await;
    let response = send(
        &t.app,
        post_form(
            &format!("/annotate/quality/{}", t.images[0]),
            "alice",
            "wonderland",
            "selectedClass=good&sure=on",
            false,
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("/annotate/quality/{}", t.images[1]).as_str()
    );
}

// =============================================================================
// Assets
// =============================================================================

#[tokio::test]
async fn test_asset_served_with_sniffed_type() {
    let t = setup_app().await;
    let response = send(&t.app, get(&format!("/asset/{}", t.images[0]))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(hash_bytes(&bytes), t.images[0]);
}

#[tokio::test]
async fn test_asset_unknown_or_missing_is_404() {
    let t = setup_app().await;
    let unknown = send(&t.app, get(&format!("/asset/{}", "a".repeat(64)))).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    std::fs::remove_file(t.images_dir.path().join(format!("{}.png", t.images[1]))).unwrap();
    let missing = send(&t.app, get(&format!("/asset/{}", t.images[1]))).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
