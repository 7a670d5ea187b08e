mod common;

use blogpoint::models::{CodePurpose, NewChannel, NewFileRecord};
use blogpoint::repo::{ChannelRepo, CounterRepo, FileRepo, StatisticsRepo, SubscriptionRepo, UserRepo, VerificationRepo};
use blogpoint::storage::ObjectStore;
use blogpoint::tasks::{cleanup_once, refresh_all_statistics, CleanupReport};
use blogpoint::verification::{consume, issue};
use chrono::{Duration, Utc};
use common::TestCtx;

#[actix_web::test]
async fn cleanup_drops_stale_unverified_accounts_and_expired_codes() {
    let ctx = TestCtx::new();
    let (stale, _) = ctx.user("stale").await;
    let (fresh, _) = ctx.user("fresh").await;
    let (verified, _) = ctx.user("verified").await;
    ctx.repo.mark_verified(verified).await.unwrap();
    let old = Utc::now() - Duration::hours(30);
    ctx.repo.backdate_user(stale, old).unwrap();
    ctx.repo.backdate_user(verified, old).unwrap();

    let channel = ctx
        .repo
        .create_channel(NewChannel { name: "kept".into(), description: String::new(), category_id: None, owner_id: verified })
        .await
        .unwrap();
    ctx.repo.subscribe(stale, channel.id).await.unwrap();
    ctx.repo.adjust_subscribers(channel.id, 1).await.unwrap();
    ctx.store.put("image/stale.png", "image/png", vec![1, 2, 3]).await.unwrap();
    let logo = ctx
        .repo
        .create_file(NewFileRecord { owner_id: stale, filename: "image/stale.png".into(), mime_type: "image/png".into() })
        .await
        .unwrap();
    ctx.repo.set_user_logo(stale, Some(logo.id)).await.unwrap();

    let now = Utc::now();
    ctx.repo
        .replace_code(fresh, CodePurpose::EmailVerification, "AAAAAA", now - Duration::minutes(1))
        .await
        .unwrap();
    ctx.repo
        .replace_code(verified, CodePurpose::AccountDeletion, "BBBBBB", now + Duration::minutes(5))
        .await
        .unwrap();

    let report = cleanup_once(&ctx.repo, ctx.store.as_ref(), now, Duration::hours(24)).await.unwrap();
    assert_eq!(report, CleanupReport { expired_codes: 1, unverified_users: 1 });
    assert!(ctx.repo.get_user(stale).await.is_err());
    assert!(!ctx.store.contains("image/stale.png"));
    assert!(ctx.repo.get_file(logo.id).await.is_err());
    assert_eq!(ctx.repo.get_channel(channel.id).await.unwrap().subs_count, 0);
    assert!(ctx.repo.get_user(fresh).await.is_ok());
    assert!(ctx.repo.get_user(verified).await.is_ok());
    assert!(ctx
        .repo
        .find_active_code(Some(verified), CodePurpose::AccountDeletion, "BBBBBB", now)
        .await
        .is_ok());
}

#[actix_web::test]
async fn codes_are_single_use_and_expire() {
    let ctx = TestCtx::new();
    let (user, _) = ctx.user("someone").await;
    let now = Utc::now();

    let code = issue(&ctx.repo, user, CodePurpose::PasswordReset, now).await.unwrap();
    assert!(consume(&ctx.repo, Some(user), CodePurpose::EmailVerification, &code, now).await.is_err());
    let row = consume(&ctx.repo, None, CodePurpose::PasswordReset, &code.to_lowercase(), now).await.unwrap();
    assert_eq!(row.user_id, user);
    assert!(consume(&ctx.repo, None, CodePurpose::PasswordReset, &code, now).await.is_err());

    let code = issue(&ctx.repo, user, CodePurpose::PasswordReset, now).await.unwrap();
    let later = now + Duration::minutes(11);
    assert!(consume(&ctx.repo, Some(user), CodePurpose::PasswordReset, &code, later).await.is_err());
}

#[actix_web::test]
async fn statistics_sweep_snapshots_every_channel() {
    let ctx = TestCtx::new();
    let (owner, _) = ctx.user("owner").await;
    let mut ids = Vec::new();
    for name in ["one", "two"] {
        let channel = ctx
            .repo
            .create_channel(NewChannel { name: name.into(), description: String::new(), category_id: None, owner_id: owner })
            .await
            .unwrap();
        ids.push(channel.id);
    }

    let now = Utc::now();
    assert_eq!(refresh_all_statistics(&ctx.repo, now).await.unwrap(), 2);
    for id in ids {
        assert!(ctx.repo.get_snapshot(id, now.date_naive()).await.unwrap().is_some());
    }
    // a second run replaces rather than duplicates
    assert_eq!(refresh_all_statistics(&ctx.repo, now).await.unwrap(), 2);
}
