//! Storage contract shared by both backends. The Postgres run is skipped
//! unless DATABASE_URL points at a scratch database.

use blogpoint::models::{Language, NewChannel, NewComment, NewFileRecord, NewPost, NewUser, UpdateChannel};
use blogpoint::repo::inmem::InMemRepo;
use blogpoint::repo::pg::PgRepo;
use blogpoint::repo::{
    ChannelRepo, CommentRepo, CounterRepo, FileRepo, PostRepo, ReactionRepo, Repo, RepoError, StatisticsRepo,
    SubscriptionRepo, TaxonomyRepo, UserRepo,
};
use sqlx::postgres::PgPoolOptions;

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

fn new_user(tag: &str, name: &str) -> NewUser {
    NewUser {
        login: format!("{name}-{tag}"),
        email: format!("{name}-{tag}@example.com"),
        password_hash: "x".into(),
        language: Language::En,
    }
}

async fn contract(r: &dyn Repo) {
    let tag = uuid::Uuid::new_v4().simple().to_string();

    // users
    let owner = r.create_user(new_user(&tag, "owner")).await.unwrap();
    let reader = r.create_user(new_user(&tag, "reader")).await.unwrap();
    assert!(!owner.is_verified);
    let err = r.create_user(new_user(&tag, "owner")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
    assert_eq!(r.find_user_by_login(&owner.login).await.unwrap().id, owner.id);

    // channels
    let categories = r.list_categories().await.unwrap();
    assert!(!categories.is_empty());
    let channel = r
        .create_channel(NewChannel {
            name: format!("chan-{tag}"),
            description: "d".into(),
            category_id: Some(categories[0].id),
            owner_id: owner.id,
        })
        .await
        .unwrap();
    let dup = NewChannel { name: channel.name.clone(), description: String::new(), category_id: None, owner_id: reader.id };
    assert!(matches!(r.create_channel(dup).await.unwrap_err(), RepoError::Conflict));
    let cleared = r
        .update_channel(channel.id, UpdateChannel { category_id: Some(None), ..UpdateChannel::default() })
        .await
        .unwrap();
    assert_eq!(cleared.category_id, None);
    assert_eq!(cleared.name, channel.name);

    // subscriptions and counters
    r.subscribe(reader.id, channel.id).await.unwrap();
    assert!(matches!(r.subscribe(reader.id, channel.id).await.unwrap_err(), RepoError::Conflict));
    r.adjust_subscribers(channel.id, 1).await.unwrap();
    assert_eq!(r.get_channel(channel.id).await.unwrap().subs_count, 1);
    assert_eq!(r.list_subscribed_channels(reader.id).await.unwrap()[0].id, channel.id);
    r.unsubscribe(reader.id, channel.id).await.unwrap();
    r.adjust_subscribers(channel.id, -1).await.unwrap();
    assert!(matches!(r.unsubscribe(reader.id, channel.id).await.unwrap_err(), RepoError::NotFound));

    // posts with attachments
    let tags = r.list_tags().await.unwrap();
    let image = r
        .create_file(NewFileRecord { owner_id: owner.id, filename: format!("image/{tag}.png"), mime_type: "image/png".into() })
        .await
        .unwrap();
    let new_post = |title: &str| NewPost {
        channel_id: channel.id,
        owner_id: owner.id,
        title: title.into(),
        content: "c".into(),
        preview_image_id: Some(image.id),
        tag_ids: vec![tags[0].id, tags[1].id],
        image_ids: vec![image.id],
        file_ids: vec![],
    };
    let post = r.create_post(new_post("first")).await.unwrap();
    assert!(matches!(r.create_post(new_post("first")).await.unwrap_err(), RepoError::Conflict));
    assert_eq!(r.tags_for_post(post.id).await.unwrap().len(), 2);
    assert_eq!(r.post_images(post.id).await.unwrap()[0].id, image.id);

    let foreign = NewPost { owner_id: reader.id, ..new_post("second") };
    assert!(matches!(r.create_post(foreign).await.unwrap_err(), RepoError::Forbidden(_)));
    assert_eq!(r.list_channel_posts(channel.id, 0, 10).await.unwrap().len(), 1);

    r.increment_views(post.id).await.unwrap();
    assert_eq!(r.get_post(post.id).await.unwrap().views_count, 1);

    // reactions are reconciled into the counters
    r.insert_reaction(reader.id, post.id, true).await.unwrap();
    r.insert_reaction(owner.id, post.id, true).await.unwrap();
    r.update_reaction(owner.id, post.id, false).await.unwrap();
    r.reconcile_reaction_counts(channel.id).await.unwrap();
    let counted = r.get_post(post.id).await.unwrap();
    assert_eq!((counted.likes_count, counted.dislikes_count), (1, 1));
    r.delete_reaction(reader.id, post.id).await.unwrap();
    assert!(r.get_reaction(reader.id, post.id).await.unwrap().is_none());

    // comments
    let root = r
        .create_comment(NewComment { post_id: post.id, parent_id: None, user_id: reader.id, content: "hi".into() })
        .await
        .unwrap();
    r.create_comment(NewComment { post_id: post.id, parent_id: Some(root.id), user_id: owner.id, content: "yo".into() })
        .await
        .unwrap();
    assert_eq!(r.count_replies(root.id).await.unwrap(), 1);
    r.redact_comment(root.id).await.unwrap();
    let listed = r.list_comments(post.id, None, 0, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_deleted);
    assert_eq!(listed[0].replies_count, 1);
    assert_eq!(listed[0].author_login, reader.login);

    // statistics
    let counters = r.channel_counters(channel.id).await.unwrap();
    assert_eq!((counters.views, counters.posts, counters.comments), (1, 1, 2));
    let today = chrono::Utc::now().date_naive();
    r.replace_snapshot(channel.id, today, counters).await.unwrap();
    r.replace_snapshot(channel.id, today, counters).await.unwrap();
    assert_eq!(r.get_snapshot(channel.id, today).await.unwrap().unwrap().counters(), counters);

    // the unverified sweep takes subscriptions and files with the accounts
    r.mark_verified(owner.id).await.unwrap();
    r.mark_verified(reader.id).await.unwrap();
    let drifter = r.create_user(new_user(&tag, "drifter")).await.unwrap();
    r.subscribe(drifter.id, channel.id).await.unwrap();
    r.adjust_subscribers(channel.id, 1).await.unwrap();
    let kept = r
        .create_file(NewFileRecord { owner_id: drifter.id, filename: format!("image/d-{tag}.png"), mime_type: "image/png".into() })
        .await
        .unwrap();
    assert!(!r.file_is_referenced(kept.id).await.unwrap());
    r.set_user_logo(drifter.id, Some(kept.id)).await.unwrap();
    assert!(r.file_is_referenced(kept.id).await.unwrap());
    assert!(r.file_is_referenced(image.id).await.unwrap());
    let swept = r.delete_unverified_before(chrono::Utc::now() + chrono::Duration::minutes(1)).await.unwrap();
    assert!(swept.users >= 1);
    assert!(swept.files.iter().any(|f| f.id == kept.id));
    assert!(matches!(r.get_user(drifter.id).await.unwrap_err(), RepoError::NotFound));
    assert!(matches!(r.get_file(kept.id).await.unwrap_err(), RepoError::NotFound));
    assert_eq!(r.get_channel(channel.id).await.unwrap().subs_count, 0);
    assert!(r.get_user(owner.id).await.is_ok());

    // removing a file clears the slots and joins that point at it
    r.delete_file_record(image.id).await.unwrap();
    assert!(r.post_images(post.id).await.unwrap().is_empty());
    assert_eq!(r.get_post(post.id).await.unwrap().preview_image_id, None);

    r.delete_channel(channel.id).await.unwrap();
    assert!(matches!(r.get_post(post.id).await.unwrap_err(), RepoError::NotFound));
    r.delete_user(reader.id).await.unwrap();
    r.delete_user(owner.id).await.unwrap();
}

#[tokio::test]
async fn inmem_repo_contract() {
    contract(&InMemRepo::new()).await;
}

#[tokio::test]
#[serial_test::serial]
async fn pg_repo_contract() {
    let Some(repo) = pg_repo().await else {
        eprintln!("skip: no DATABASE_URL");
        return;
    };
    contract(&repo).await;
}
