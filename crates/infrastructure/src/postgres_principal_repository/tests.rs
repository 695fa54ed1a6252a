use chrono::Utc;
use praetor_application::{PrincipalRepository, PrincipalUpsert};
use praetor_core::{AppError, PrincipalId};
use praetor_domain::parse_ip_ranges;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresPrincipalRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres principal tests: {error}");
    }

    Some(pool)
}

fn upsert(external_ref: &str, is_super_admin: bool) -> PrincipalUpsert {
    PrincipalUpsert {
        external_ref: external_ref.to_owned(),
        email: Some(format!("{external_ref}@example.com")),
        is_super_admin,
        login_at: Utc::now(),
    }
}

#[tokio::test]
async fn upsert_keeps_identity_and_refreshes_claims() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresPrincipalRepository::new(pool);
    let external_ref = format!("idp|{}", PrincipalId::new());

    let created = repository.upsert_principal(upsert(&external_ref, false)).await;
    let refreshed = repository.upsert_principal(upsert(&external_ref, true)).await;
    let by_ref = repository.find_principal_by_external_ref(&external_ref).await;

    let (Ok(created), Ok(refreshed)) = (created, refreshed) else {
        panic!("upserts should succeed");
    };
    assert_eq!(created.id, refreshed.id);
    assert!(created.is_active && created.allowed_ip_ranges.is_empty());
    assert!(refreshed.is_super_admin);
    assert!(matches!(by_ref, Ok(Some(ref found)) if found.id == created.id));
}

#[tokio::test]
async fn security_settings_roundtrip_ip_ranges() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresPrincipalRepository::new(pool);
    let principal = repository
        .upsert_principal(upsert(&format!("idp|{}", PrincipalId::new()), false))
        .await
        .unwrap_or_else(|_| unreachable!());
    let ranges =
        parse_ip_ranges(["10.0.0.0/8", "2001:db8::/32"]).unwrap_or_else(|_| unreachable!());

    let updated = repository
        .update_security_settings(principal.id, true, ranges.clone())
        .await;

    assert!(matches!(
        updated,
        Ok(ref updated) if updated.require_mfa
            && updated.allowed_ip_ranges == ranges
            && updated.assignment_version > principal.assignment_version
    ));
}

#[tokio::test]
async fn set_active_on_missing_principal_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresPrincipalRepository::new(pool);
    let result = repository.set_active(PrincipalId::new(), false).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}
