mod common;

use std::time::Duration;

use actix_web::{http::StatusCode, test, App};
use blogpoint::config;
use blogpoint::rate_limit::{RateLimitConfig, RateLimiterFacade};
use blogpoint::repo::FileRepo;
use blogpoint::storage::ObjectStore;
use common::{bearer, multipart, sample_png, TestCtx};
use serde_json::Value;

fn upload(token: &str, name: &str, bytes: &[u8]) -> test::TestRequest {
    let (content_type, body) = multipart(name, bytes);
    test::TestRequest::post()
        .uri("/api/uploadFile")
        .insert_header(bearer(token))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
}

#[actix_web::test]
async fn upload_accepts_any_type_and_sniffs_it() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let body: Value = test::call_and_read_body_json(&app, upload(&token, "notes.txt", b"plain words").to_request()).await;
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["data"]["mimeType"], "text/plain");
    let id = body["data"]["id"].as_i64().unwrap();
    let record = ctx.repo.get_file(id).await.unwrap();
    assert_eq!(record.owner_id, owner);
    assert!(record.filename.starts_with("text/"));
    assert!(record.filename.ends_with(".txt"));
    assert_eq!(body["data"]["url"], format!("http://storage.test/bucket/{}", record.filename));

    // the client's name does not decide the type
    let body: Value = test::call_and_read_body_json(&app, upload(&token, "avatar.txt", &sample_png()).to_request()).await;
    assert_eq!(body["data"]["mimeType"], "image/png");
    assert_eq!(ctx.store.keys().len(), 2);

    let req = upload(&token, "empty.bin", b"").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
    let mut ctx = TestCtx::new();
    ctx.config.max_upload_bytes = 16;
    let (_, token) = ctx.user("owner").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let resp = test::call_service(&app, upload(&token, "big.txt", &[b'a'; 64]).to_request()).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(ctx.store.keys().is_empty());
}

#[actix_web::test]
async fn uploads_are_rate_limited_per_user() {
    let mut ctx = TestCtx::new();
    ctx.rate_limiter = Some(RateLimiterFacade::new(RateLimitConfig {
        upload_limit: 2,
        upload_window: Duration::from_secs(60),
        ..RateLimitConfig::default()
    }));
    let (_, token) = ctx.user("owner").await;
    let (_, other) = ctx.user("other").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    for _ in 0..2 {
        let resp = test::call_service(&app, upload(&token, "a.txt", b"abc").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = test::call_service(&app, upload(&token, "a.txt", b"abc").to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let resp = test::call_service(&app, upload(&other, "a.txt", b"abc").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn delete_file_checks_owner_and_storage() {
    let ctx = TestCtx::new();
    let (_, token) = ctx.user("owner").await;
    let (_, stranger) = ctx.user("stranger").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let body: Value = test::call_and_read_body_json(&app, upload(&token, "a.txt", b"abc").to_request()).await;
    let id = body["data"]["id"].as_i64().unwrap();
    let delete = |token: &str| {
        test::TestRequest::delete()
            .uri(&format!("/api/deleteFile/{id}"))
            .insert_header(bearer(token))
            .to_request()
    };

    assert_eq!(test::call_service(&app, delete(&stranger)).await.status(), StatusCode::FORBIDDEN);

    let body: Value = test::call_and_read_body_json(&app, delete(&token)).await;
    assert_eq!(body["message"], "File deleted successfully");
    assert!(ctx.store.keys().is_empty());
    assert!(ctx.repo.get_file(id).await.is_err());

    assert_eq!(test::call_service(&app, delete(&token)).await.status(), StatusCode::NOT_FOUND);

    // record without its object
    let body: Value = test::call_and_read_body_json(&app, upload(&token, "b.txt", b"xyz").to_request()).await;
    let orphan = body["data"]["id"].as_i64().unwrap();
    let key = ctx.repo.get_file(orphan).await.unwrap().filename;
    ctx.store.delete(&key).await.unwrap();
    let req = test::TestRequest::delete()
        .uri(&format!("/api/deleteFile/{orphan}"))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(ctx.repo.get_file(orphan).await.is_ok());
}
