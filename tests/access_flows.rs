use anyhow::{Context, Result};
use entity::auth_token;
use platform_api::ApiError;
use platform_db::DbPool;
use products_crm::{
    AccessConfig,
    access::{self, ChangePasswordInput, LoginInput, RegisterInput, ResetConfirm, ResetRequest},
};
use sea_orm::{EntityTrait, PaginatorTrait};
use suite_tests::{BASE_URL, CapturingMailer, access_config, memory_db, reset_link_parts};

const PASSWORD: &str = "correct-horse-42";

async fn register(db: &DbPool, config: &AccessConfig, username: &str) -> Result<String> {
    let payload = access::register(
        db,
        config,
        RegisterInput {
            username: Some(username.into()),
            email: Some(format!("{username}@crm.test")),
            password: Some(PASSWORD.into()),
            ..Default::default()
        },
    )
    .await?;
    Ok(payload.token)
}

fn login_input(username: &str, password: &str) -> LoginInput {
    LoginInput {
        username: Some(username.into()),
        password: Some(password.into()),
    }
}

#[tokio::test]
async fn first_registrant_is_superuser() -> Result<()> {
    let db = memory_db().await?;
    let config = access_config();
    let first = register(&db, &config, "founder").await?;
    let second = register(&db, &config, "hire").await?;

    assert!(access::authenticate(&db, &first).await?.is_superuser);
    assert!(!access::authenticate(&db, &second).await?.is_superuser);

    let err = register(&db, &config, "hire").await.expect_err("duplicate username");
    assert!(matches!(
        err.downcast_ref::<ApiError>(),
        Some(ApiError::Conflict(_))
    ));
    Ok(())
}

#[tokio::test]
async fn login_reuses_the_live_session() -> Result<()> {
    let db = memory_db().await?;
    let config = access_config();
    let token = register(&db, &config, "dana").await?;

    let payload = access::login(&db, &config, login_input("dana", PASSWORD)).await?;
    assert_eq!(payload.token, token);
    assert_eq!(payload.username, "dana");
    let employee = access::authenticate(&db, &token).await?;
    assert!(employee.last_login.is_some());

    let err = access::login(&db, &config, login_input("dana", "wrong-password"))
        .await
        .expect_err("bad password");
    assert!(matches!(err, ApiError::Unauthorized(_)));

    access::logout(&db, &token).await?;
    assert!(access::authenticate(&db, &token).await.is_err());
    Ok(())
}

#[tokio::test]
async fn simultaneous_logins_share_one_session() -> Result<()> {
    let db = memory_db().await?;
    let config = access_config();
    let token = register(&db, &config, "dana").await?;
    access::logout(&db, &token).await?;

    let (first, second) = tokio::join!(
        access::login(&db, &config, login_input("dana", PASSWORD)),
        access::login(&db, &config, login_input("dana", PASSWORD)),
    );
    let (first, second) = (first?, second?);
    assert_eq!(first.token, second.token);
    assert_ne!(first.token, token);
    assert_eq!(auth_token::Entity::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn change_password_checks_the_old_one() -> Result<()> {
    let db = memory_db().await?;
    let config = access_config();
    let token = register(&db, &config, "dana").await?;
    let employee = access::authenticate(&db, &token).await?;

    let err = access::change_password(
        &db,
        &employee,
        ChangePasswordInput {
            old_password: Some("not-my-password".into()),
            new_password: Some("brand-new-secret-7".into()),
        },
    )
    .await
    .expect_err("wrong old password");
    match err {
        ApiError::Validation(fields) => {
            assert_eq!(
                fields.get("old_password"),
                Some(&["Old password is incorrect.".to_string()][..])
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }

    access::change_password(
        &db,
        &employee,
        ChangePasswordInput {
            old_password: Some(PASSWORD.into()),
            new_password: Some("brand-new-secret-7".into()),
        },
    )
    .await?;

    assert!(access::authenticate(&db, &token).await.is_err());
    assert!(access::login(&db, &config, login_input("dana", PASSWORD)).await.is_err());
    access::login(&db, &config, login_input("dana", "brand-new-secret-7")).await?;
    Ok(())
}

#[tokio::test]
async fn reset_link_sets_a_new_password_once() -> Result<()> {
    let db = memory_db().await?;
    let config = access_config();
    register(&db, &config, "dana").await?;
    let mailer = CapturingMailer::default();

    let sent = access::request_password_reset(
        &db,
        &config,
        &mailer,
        ResetRequest {
            email: Some("DANA@crm.test".into()),
        },
    )
    .await?;
    assert_eq!(sent, 1);
    let messages = mailer.messages();
    assert_eq!(messages[0].to, "dana@crm.test");
    assert!(messages[0].body.contains(BASE_URL));
    let (uid, token) = reset_link_parts(&messages[0].body).context("reset link")?;

    let confirm = || ResetConfirm {
        new_password: Some("after-reset-secret-9".into()),
    };
    access::confirm_password_reset(&db, &config, &uid, &token, confirm()).await?;
    access::login(&db, &config, login_input("dana", "after-reset-secret-9")).await?;

    let err = access::confirm_password_reset(&db, &config, &uid, &token, confirm())
        .await
        .expect_err("link is single use");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("token")));
    Ok(())
}

#[tokio::test]
async fn reset_for_unknown_email_is_rejected() -> Result<()> {
    let db = memory_db().await?;
    let mailer = CapturingMailer::default();
    let err = access::request_password_reset(
        &db,
        &access_config(),
        &mailer,
        ResetRequest {
            email: Some("nobody@crm.test".into()),
        },
    )
    .await
    .expect_err("unknown email");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("email")));
    assert!(mailer.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn weak_passwords_are_refused() -> Result<()> {
    let db = memory_db().await?;
    let err = access::register(
        &db,
        &access_config(),
        RegisterInput {
            username: Some("dana".into()),
            email: Some("dana@crm.test".into()),
            password: Some("12345678".into()),
            ..Default::default()
        },
    )
    .await
    .expect_err("numeric password");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("password")));
    Ok(())
}
