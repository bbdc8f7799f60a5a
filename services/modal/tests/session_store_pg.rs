//! PostgreSQL session store tests
//!
//! They need a running PostgreSQL instance reachable through `DATABASE_URL`.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use common::database::{DatabaseConfig, begin_transaction, commit_transaction, init_pool};
use modal::custom_id::{Feature, Flow};
use modal::models::{NewSession, SessionStatus};
use modal::repositories::{PgSessionStore, SessionStore, StoreError, run_migrations, session};

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn setup() -> Result<PgPool, Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

fn new_session(owner: &str) -> NewSession {
    NewSession {
        session_id: Uuid::new_v4().simple().to_string(),
        feature: Feature::Nominations,
        flow: Flow::Nominate,
        owner_user_id: owner.to_string(),
        guild_id: Some("guild-1".to_string()),
        channel_id: None,
        state_json: r#"{"round":3}"#.to_string(),
        ttl_seconds: 900,
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_create_and_get() -> TestResult {
    let store = PgSessionStore::new(setup().await?);
    let input = new_session("u1");

    let created = store.create(input.clone()).await?;
    assert_eq!(created.status, SessionStatus::Open);
    assert!(created.expires_at > created.created_at);

    let fetched = store.get(&input.session_id).await?;
    assert_eq!(fetched.feature, Feature::Nominations);
    assert_eq!(fetched.flow, Flow::Nominate);
    assert_eq!(fetched.state_json, r#"{"round":3}"#);

    assert!(matches!(
        store.create(input).await,
        Err(StoreError::DuplicateSession(_))
    ));
    assert!(matches!(
        store.get("does-not-exist").await,
        Err(StoreError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_concurrent_claims_have_one_winner() -> TestResult {
    let store = PgSessionStore::new(setup().await?);
    let session = store.create(new_session("u1")).await?;

    let now = Utc::now();
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            let id = session.session_id.clone();
            tokio::spawn(async move { store.claim_for_submit(&id, "u1", now).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await?? {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(
        store.get(&session.session_id).await?.status,
        SessionStatus::Submitted
    );
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_expire_and_sweep() -> TestResult {
    let store = PgSessionStore::new(setup().await?);
    let session = store.create(new_session("u1")).await?;

    assert!(!store.expire(&session.session_id, Utc::now()).await?);
    assert!(store.expire(&session.session_id, session.expires_at).await?);
    assert!(
        !store
            .claim_for_submit(&session.session_id, "u1", session.created_at)
            .await?
    );

    let removed = store
        .sweep_expired(session.expires_at + Duration::seconds(1))
        .await?;
    assert!(removed >= 1);
    assert!(matches!(
        store.get(&session.session_id).await,
        Err(StoreError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_queries_borrow_a_transaction() -> TestResult {
    let pool = setup().await?;
    let store = PgSessionStore::new(pool.clone());

    let committed = new_session("u1").into_session(Utc::now());
    let dropped = new_session("u1").into_session(Utc::now());

    let mut tx = begin_transaction(&pool).await?;
    session::insert_session(&mut *tx, &committed).await?;
    assert!(session::claim_for_submit(&mut *tx, &committed.session_id, "u1", Utc::now()).await?);
    commit_transaction(tx).await?;

    {
        let mut tx = begin_transaction(&pool).await?;
        session::insert_session(&mut *tx, &dropped).await?;
    }

    assert_eq!(
        store.get(&committed.session_id).await?.status,
        SessionStatus::Submitted
    );
    assert!(session::find_session(&pool, &dropped.session_id).await?.is_none());
    Ok(())
}
