//! Employee sign-up, sessions and password management.
//!
//! Sessions are opaque keys in `auth_token`, at most one per employee.
//! Reset links carry the base64 employee id and a JWT keyed on the current
//! password hash; once the password changes every outstanding link is dead.

use chrono::Utc;
use entity::{auth_token, employee};
use platform_api::{ApiError, ApiResult, FieldErrors};
use platform_authn::{
    AuthConfig, decode_uid, encode_uid, generate_session_key, hash_password, issue_reset_token,
    password_problems, verify_password, verify_reset_token,
};
use platform_db::{DbPool, db_error, db_error_or_conflict, is_unique_violation};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::mail::{Mailer, OutgoingMail};
use crate::validate;

const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";
const DUPLICATE_USERNAME: &str = "A user with that username already exists.";
const BAD_RESET_LINK: &str = "The reset link is invalid or has expired.";

#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub auth: AuthConfig,
    /// Prefix for links sent by mail, e.g. `https://crm.example.com`.
    pub public_base_url: String,
    pub mail_from: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RegisterInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginInput {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResetRequest {
    pub email: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResetConfirm {
    pub new_password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginPayload {
    pub token: String,
    pub is_superuser: bool,
    pub username: String,
}

pub(crate) fn new_password(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<String> {
    let Some(password) = value else {
        errors.add(field, validate::REQUIRED);
        return None;
    };
    let problems = password_problems(password);
    if problems.is_empty() {
        return Some(password.to_string());
    }
    for problem in problems {
        errors.add(field, problem);
    }
    None
}

pub(crate) fn hash(password: &str) -> ApiResult<String> {
    hash_password(password).map_err(|err| ApiError::internal(err.into()))
}

fn password_matches(password: &str, stored_hash: &str) -> ApiResult<bool> {
    verify_password(password, stored_hash).map_err(|err| ApiError::internal(err.into()))
}

/// Return the employee's live session key, replacing an expired one.
async fn ensure_session<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    config: &AuthConfig,
    employee_id: i32,
) -> ApiResult<String> {
    let now = Utc::now();
    let existing = auth_token::Entity::find()
        .filter(auth_token::Column::EmployeeId.eq(employee_id))
        .one(db)
        .await
        .map_err(db_error)?;
    if let Some(token) = existing {
        match token.expires_at {
            Some(expires_at) if expires_at <= now => {
                auth_token::Entity::delete_by_id(token.key)
                    .exec(db)
                    .await
                    .map_err(db_error)?;
            }
            _ => return Ok(token.key),
        }
    }
    let key = generate_session_key();
    // Savepoint so a lost race leaves the outer transaction usable.
    let savepoint = db.begin().await.map_err(db_error)?;
    let inserted = auth_token::ActiveModel {
        key: Set(key.clone()),
        employee_id: Set(employee_id),
        created_at: Set(now.into()),
        expires_at: Set(config.session_ttl().map(|ttl| (now + ttl).into())),
    }
    .insert(&savepoint)
    .await;
    match inserted {
        Ok(_) => {
            savepoint.commit().await.map_err(db_error)?;
            Ok(key)
        }
        // A concurrent login for the same employee stored its key first.
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await.map_err(db_error)?;
            auth_token::Entity::find()
                .filter(auth_token::Column::EmployeeId.eq(employee_id))
                .one(db)
                .await
                .map_err(db_error)?
                .map(|token| token.key)
                .ok_or_else(|| ApiError::internal(anyhow::anyhow!("session row vanished")))
        }
        Err(err) => Err(db_error(err)),
    }
}

async fn revoke_sessions<C: ConnectionTrait>(db: &C, employee_id: i32) -> ApiResult<()> {
    auth_token::Entity::delete_many()
        .filter(auth_token::Column::EmployeeId.eq(employee_id))
        .exec(db)
        .await
        .map_err(db_error)?;
    Ok(())
}

#[instrument(skip(db, config, input))]
pub async fn register(db: &DbPool, config: &AccessConfig, input: RegisterInput) -> ApiResult<TokenPayload> {
    let mut errors = FieldErrors::new();
    let username = validate::username(&mut errors, input.username.as_deref());
    let email = validate::required_email(&mut errors, "email", input.email.as_deref());
    let password = new_password(&mut errors, "password", input.password.as_deref());
    let first_name = validate::optional_text(&mut errors, "first_name", input.first_name, 150);
    let last_name = validate::optional_text(&mut errors, "last_name", input.last_name, 150);
    let department = validate::optional_text(&mut errors, "department", input.department, 100);
    let position = validate::optional_text(&mut errors, "position", input.position, 100);
    let phone = validate::phone(&mut errors, input.phone);
    errors.into_result()?;
    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(ApiError::internal(anyhow::anyhow!("validated fields missing")));
    };
    let password_hash = hash(&password)?;

    let txn = db.begin().await.map_err(db_error)?;
    let first_employee = employee::Entity::find().count(&txn).await.map_err(db_error)? == 0;
    let created = employee::ActiveModel {
        username: Set(username),
        email: Set(email),
        password_hash: Set(password_hash),
        first_name: Set(first_name.unwrap_or_default()),
        last_name: Set(last_name.unwrap_or_default()),
        department: Set(department),
        position: Set(position),
        phone: Set(phone),
        salary_cents: Set(None),
        is_active: Set(true),
        is_superuser: Set(first_employee),
        date_joined: Set(Utc::now().into()),
        last_login: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(db_error_or_conflict(DUPLICATE_USERNAME))?;
    let token = ensure_session(&txn, &config.auth, created.id).await?;
    txn.commit().await.map_err(db_error)?;

    tracing::info!(employee_id = created.id, superuser = first_employee, "employee registered");
    Ok(TokenPayload { token })
}

#[instrument(skip(db, config, input), fields(username = input.username.as_deref().unwrap_or("")))]
pub async fn login(db: &DbPool, config: &AccessConfig, input: LoginInput) -> ApiResult<LoginPayload> {
    let mut errors = FieldErrors::new();
    let username = validate::required_text(&mut errors, "username", input.username.as_deref(), 150);
    if input.password.as_deref().is_none_or(str::is_empty) {
        errors.add("password", validate::REQUIRED);
    }
    errors.into_result()?;
    let (Some(username), Some(password)) = (username, input.password) else {
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    };

    let Some(employee) = employee::Entity::find()
        .filter(employee::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(db_error)?
    else {
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    };
    if !password_matches(&password, &employee.password_hash)? {
        tracing::info!(employee_id = employee.id, "login rejected");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }
    if !employee.is_active {
        return Err(ApiError::unauthorized("User account is disabled."));
    }

    let txn = db.begin().await.map_err(db_error)?;
    let token = ensure_session(&txn, &config.auth, employee.id).await?;
    let mut active: employee::ActiveModel = employee.clone().into();
    active.last_login = Set(Some(Utc::now().into()));
    active.update(&txn).await.map_err(db_error)?;
    txn.commit().await.map_err(db_error)?;

    Ok(LoginPayload {
        token,
        is_superuser: employee.is_superuser,
        username: employee.username,
    })
}

#[instrument(skip_all)]
pub async fn logout(db: &DbPool, key: &str) -> ApiResult<()> {
    auth_token::Entity::delete_by_id(key.to_string())
        .exec(db)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Resolve a session key to its active employee.
pub async fn authenticate(db: &DbPool, key: &str) -> ApiResult<employee::Model> {
    let invalid = || ApiError::unauthorized("Invalid token.");
    let (token, employee) = auth_token::Entity::find_by_id(key.to_string())
        .find_also_related(employee::Entity)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(invalid)?;
    if token.expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
        return Err(ApiError::unauthorized("Token has expired."));
    }
    let employee = employee.ok_or_else(invalid)?;
    if !employee.is_active {
        return Err(ApiError::unauthorized("User inactive or deleted."));
    }
    Ok(employee)
}

/// Mail a reset link to every active employee registered under the address.
#[instrument(skip_all)]
pub async fn request_password_reset(
    db: &DbPool,
    config: &AccessConfig,
    mailer: &dyn Mailer,
    input: ResetRequest,
) -> ApiResult<usize> {
    let mut errors = FieldErrors::new();
    let email = validate::required_email(&mut errors, "email", input.email.as_deref());
    errors.into_result()?;
    let Some(email) = email else {
        return Err(ApiError::invalid("email", validate::REQUIRED));
    };

    let employees = employee::Entity::find()
        .filter(employee::Column::Email.eq(email.as_str()))
        .filter(employee::Column::IsActive.eq(true))
        .all(db)
        .await
        .map_err(db_error)?;
    if employees.is_empty() {
        return Err(ApiError::invalid(
            "email",
            "There is no active employee registered with this e-mail address.",
        ));
    }

    let base = config.public_base_url.trim_end_matches('/');
    for employee in &employees {
        let token = issue_reset_token(employee.id, &employee.password_hash, &config.auth)
            .map_err(|err| ApiError::internal(err.into()))?;
        let link = format!(
            "{base}/api/employee/reset-password-confirm/{}/{token}/",
            encode_uid(employee.id)
        );
        mailer
            .send(OutgoingMail {
                from: config.mail_from.clone(),
                to: employee.email.clone(),
                subject: "Password reset".into(),
                body: format!(
                    "Hello {},\n\nUse the link below to choose a new password:\n\n{link}\n\n\
                     If you did not ask for a reset you can ignore this message.\n",
                    employee.username
                ),
            })
            .await
            .map_err(ApiError::internal)?;
    }
    tracing::info!(recipients = employees.len(), "password reset mailed");
    Ok(employees.len())
}

#[instrument(skip_all)]
pub async fn confirm_password_reset(
    db: &DbPool,
    config: &AccessConfig,
    uid: &str,
    token: &str,
    input: ResetConfirm,
) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    let password = new_password(&mut errors, "new_password", input.new_password.as_deref());
    errors.into_result()?;

    let employee_id = decode_uid(uid).map_err(|_| ApiError::invalid("token", BAD_RESET_LINK))?;
    let employee = employee::Entity::find_by_id(employee_id)
        .one(db)
        .await
        .map_err(db_error)?
        .filter(|employee| employee.is_active)
        .ok_or_else(|| ApiError::invalid("token", BAD_RESET_LINK))?;
    verify_reset_token(token, employee.id, &employee.password_hash, &config.auth)
        .map_err(|_| ApiError::invalid("token", BAD_RESET_LINK))?;

    let Some(password) = password else {
        return Err(ApiError::invalid("new_password", validate::REQUIRED));
    };
    set_password(db, employee, &password).await?;
    tracing::info!(employee_id, "password reset completed");
    Ok(())
}

#[instrument(skip_all, fields(employee_id = employee.id))]
pub async fn change_password(
    db: &DbPool,
    employee: &employee::Model,
    input: ChangePasswordInput,
) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    match input.old_password.as_deref() {
        None => errors.add("old_password", validate::REQUIRED),
        Some(old) if !password_matches(old, &employee.password_hash)? => {
            errors.add("old_password", "Old password is incorrect.");
        }
        Some(_) => {}
    }
    let password = new_password(&mut errors, "new_password", input.new_password.as_deref());
    errors.into_result()?;
    let Some(password) = password else {
        return Err(ApiError::invalid("new_password", validate::REQUIRED));
    };
    set_password(db, employee.clone(), &password).await
}

/// Store a new hash and drop the employee's session.
async fn set_password(db: &DbPool, employee: employee::Model, password: &str) -> ApiResult<()> {
    let password_hash = hash(password)?;
    let employee_id = employee.id;
    let txn = db.begin().await.map_err(db_error)?;
    let mut active: employee::ActiveModel = employee.into();
    active.password_hash = Set(password_hash);
    active.update(&txn).await.map_err(db_error)?;
    revoke_sessions(&txn, employee_id).await?;
    txn.commit().await.map_err(db_error)?;
    Ok(())
}
