mod common;

use actix_web::{http::StatusCode, test, App};
use blogpoint::config;
use blogpoint::models::{Id, NewChannel, NewPost, StatCounters};
use blogpoint::repo::{ChannelRepo, CounterRepo, PostRepo, UserRepo};
use chrono::{Days, Utc};
use common::{bearer, multipart, sample_png, TestCtx};
use serde_json::{json, Value};

async fn channel(ctx: &TestCtx, owner: Id, name: &str) -> Id {
    ctx.repo
        .create_channel(NewChannel { name: name.into(), description: String::new(), category_id: None, owner_id: owner })
        .await
        .unwrap()
        .id
}

#[actix_web::test]
async fn create_and_conflict_on_duplicate_name() {
    let ctx = TestCtx::new();
    let (_, token) = ctx.user("owner").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/createChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"name": "Rust news", "description": "weekly", "categoryId": 2}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Channel created successfully");
    assert_eq!(body["data"]["category"]["name"], "Технологии");
    assert_eq!(body["data"]["subsCount"], 0);

    let req = test::TestRequest::post()
        .uri("/api/createChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"name": "Rust news", "description": "again"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/createChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"name": "Other", "categoryId": 999}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/createChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"name": "   "}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn edit_is_owner_only_and_zero_clears_category() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let (_, stranger) = ctx.user("stranger").await;
    let id = ctx
        .repo
        .create_channel(NewChannel { name: "c".into(), description: "d".into(), category_id: Some(1), owner_id: owner })
        .await
        .unwrap()
        .id;
    channel(&ctx, owner, "taken").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let req = test::TestRequest::patch()
        .uri("/api/editChannel")
        .insert_header(bearer(&stranger))
        .set_json(json!({"channelId": id, "name": "mine"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::patch()
        .uri("/api/editChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"channelId": id, "name": "taken"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::patch()
        .uri("/api/editChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"channelId": id, "name": "", "description": "", "categoryId": 0}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["name"], "c");
    assert_eq!(body["data"]["description"], "d");
    assert!(body["data"]["category"].is_null());
}

#[actix_web::test]
async fn channel_writes_name_the_missing_row() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let (ghost, ghost_token) = ctx.user("ghost").await;
    let id = channel(&ctx, owner, "c").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let req = test::TestRequest::patch()
        .uri("/api/editChannel")
        .insert_header(bearer(&token))
        .set_json(json!({"channelId": id, "name": "", "description": "", "categoryId": 999}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Category not found");

    // a token outliving its account is not a category problem
    ctx.repo.delete_user(ghost).await.unwrap();
    let req = test::TestRequest::post()
        .uri("/api/createChannel")
        .insert_header(bearer(&ghost_token))
        .set_json(json!({"name": "Orphan", "categoryId": 2}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User not found");
    assert_eq!(ctx.repo.list_channel_ids().await.unwrap(), vec![id]);
}

#[actix_web::test]
async fn double_subscribe_conflicts_and_keeps_the_counter() {
    let ctx = TestCtx::new();
    let (owner, _) = ctx.user("owner").await;
    let (_, fan) = ctx.user("fan").await;
    let id = channel(&ctx, owner, "c").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let subscribe = || {
        test::TestRequest::post()
            .uri(&format!("/api/subscribeChannel/{id}"))
            .insert_header(bearer(&fan))
            .to_request()
    };
    assert_eq!(test::call_service(&app, subscribe()).await.status(), StatusCode::OK);
    let resp = test::call_service(&app, subscribe()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Already subscribed");
    assert_eq!(ctx.repo.get_channel(id).await.unwrap().subs_count, 1);

    let req = test::TestRequest::get().uri("/api/getUserSubscriptions").insert_header(bearer(&fan)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let unsubscribe = || {
        test::TestRequest::delete()
            .uri(&format!("/api/unsubscribeChannel/{id}"))
            .insert_header(bearer(&fan))
            .to_request()
    };
    assert_eq!(test::call_service(&app, unsubscribe()).await.status(), StatusCode::OK);
    assert_eq!(test::call_service(&app, unsubscribe()).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.repo.get_channel(id).await.unwrap().subs_count, 0);

    let req = test::TestRequest::post()
        .uri("/api/subscribeChannel/4242")
        .insert_header(bearer(&fan))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn popular_channels_order_by_subscribers() {
    let ctx = TestCtx::new();
    let (owner, _) = ctx.user("owner").await;
    let quiet = channel(&ctx, owner, "quiet").await;
    let loud = channel(&ctx, owner, "loud").await;
    ctx.repo.adjust_subscribers(loud, 5).await.unwrap();
    ctx.repo.adjust_subscribers(quiet, 1).await.unwrap();
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/getPopularChannels?limit=1").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "loud");

    let req = test::TestRequest::get().uri("/api/getPopularChannels?limit=0").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn empty_listings_say_so() {
    let ctx = TestCtx::new();
    let (_, token) = ctx.user("loner").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/getUserChannels").insert_header(bearer(&token)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "No channels found");
    assert_eq!(body["data"], json!([]));
}

#[actix_web::test]
async fn replacing_a_channel_logo_deletes_the_old_object() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let id = channel(&ctx, owner, "c").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let upload = || {
        let (content_type, body) = multipart("logo.png", &sample_png());
        test::TestRequest::post()
            .uri(&format!("/api/uploadChannelLogo/{id}"))
            .insert_header(bearer(&token))
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
            .to_request()
    };

    let resp = test::call_service(&app, upload()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first = ctx.store.keys();
    assert_eq!(first.len(), 1);
    assert!(first[0].starts_with("image/"));

    let resp = test::call_service(&app, upload()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let second = ctx.store.keys();
    assert_eq!(second.len(), 1);
    assert!(!ctx.store.contains(&first[0]));

    let logo = ctx.repo.get_channel(id).await.unwrap().logo_id;
    assert!(logo.is_some());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/deleteChannelLogo/{id}"))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert!(ctx.store.keys().is_empty());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/deleteChannelLogo/{id}"))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "No logo to delete");
}

#[actix_web::test]
async fn non_image_logo_is_rejected() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let id = channel(&ctx, owner, "c").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let (content_type, body) = multipart("notes.txt", b"plain words");
    let req = test::TestRequest::post()
        .uri(&format!("/api/uploadChannelLogo/{id}"))
        .insert_header(bearer(&token))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.store.keys().is_empty());
}

#[actix_web::test]
async fn deleting_a_channel_removes_its_logo() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let id = channel(&ctx, owner, "c").await;
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    let (content_type, body) = multipart("logo.png", &sample_png());
    let req = test::TestRequest::post()
        .uri(&format!("/api/uploadChannelLogo/{id}"))
        .insert_header(bearer(&token))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/deleteChannel/{id}"))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert!(ctx.store.keys().is_empty());

    let req = test::TestRequest::get().uri(&format!("/api/getChannel/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn statistics_delta_against_baseline() {
    let ctx = TestCtx::new();
    let (owner, token) = ctx.user("owner").await;
    let (_, stranger) = ctx.user("stranger").await;
    let id = channel(&ctx, owner, "c").await;
    let post = ctx
        .repo
        .create_post(NewPost {
            channel_id: id,
            owner_id: owner,
            title: "t".into(),
            content: "c".into(),
            preview_image_id: None,
            tag_ids: vec![1],
            image_ids: vec![],
            file_ids: vec![],
        })
        .await
        .unwrap();
    for _ in 0..5 {
        ctx.repo.increment_views(post.id).await.unwrap();
    }
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;

    // no baseline yet: delta equals current
    let req = test::TestRequest::get()
        .uri(&format!("/api/getChannelStatistics/{id}?period=week"))
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["current"]["views"], 5);
    assert_eq!(body["data"]["delta"], body["data"]["current"]);

    let yesterday = Utc::now().date_naive().checked_sub_days(Days::new(1)).unwrap();
    ctx.repo.put_snapshot(id, yesterday, StatCounters { views: 2, posts: 1, ..StatCounters::default() });
    let req = test::TestRequest::get()
        .uri(&format!("/api/getChannelStatistics/{id}"))
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["delta"]["views"], 3);
    assert_eq!(body["data"]["delta"]["posts"], 0);

    let req = test::TestRequest::get()
        .uri(&format!("/api/getChannelStatistics/{id}?period=decade"))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/getChannelStatistics/{id}"))
        .insert_header(bearer(&stranger))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn taxonomy_is_seeded() {
    let ctx = TestCtx::new();
    let app = test::init_service(App::new().app_data(ctx.data()).configure(config)).await;
    let body: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/getAllCategories").to_request()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/getAllTags").to_request()).await;
    let tags = body["data"].as_array().unwrap();
    assert_eq!(tags.len(), 6);
    assert_eq!(tags[0]["categoryId"], 1);
    assert_eq!(tags[0]["color"], "#FF9800");
}
