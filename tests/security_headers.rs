mod common;

use actix_web::{test, web, App, HttpResponse};
use blogpoint::{config, AppConfig, SecurityHeaders};
use common::TestCtx;

#[actix_web::test]
async fn security_headers_present() {
    let ctx = TestCtx::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(&ctx.config))
            .app_data(ctx.data())
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/getAllCategories").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none());
}

#[actix_web::test]
async fn csp_allows_the_storage_endpoint() {
    let mut cfg = AppConfig::default();
    cfg.storage.public_endpoint = "https://cdn.example.org/".into();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(&cfg))
            .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert!(csp.contains("img-src 'self' data: https://cdn.example.org;"));
    assert!(csp.contains("media-src 'self' https://cdn.example.org;"));
}

#[actix_web::test]
async fn hsts_follows_config_and_builder() {
    let mut cfg = AppConfig::default();
    cfg.enable_hsts = true;
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(&cfg))
            .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert!(resp.headers().get("strict-transport-security").is_some());

    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(&cfg).with_hsts(false))
            .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert!(resp.headers().get("strict-transport-security").is_none());

    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default().with_hsts(true))
            .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert!(resp.headers().get("strict-transport-security").is_some());
}

#[actix_web::test]
async fn existing_csp_header_preserved() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default()).route(
            "/custom",
            web::get().to(|| async {
                HttpResponse::Ok()
                    .insert_header((actix_web::http::header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                    .finish()
            }),
        ),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/custom").to_request()).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
}

#[actix_web::test]
async fn docs_are_served_without_csp() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .route("/docs/index.html", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/docs/index.html").to_request()).await;
    assert!(resp.headers().get("content-security-policy").is_none());
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
}
