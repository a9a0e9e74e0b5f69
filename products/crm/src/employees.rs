use chrono::Utc;
use entity::employee;
use platform_api::{ApiError, ApiResult, FieldErrors};
use platform_db::{DbPool, db_error, db_error_or_conflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, Order, QueryFilter, Set,
    prelude::DateTimeWithTimeZone,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::access::{hash, new_password};
use crate::money::Money;
use crate::query::{self, Page};
use crate::validate::{self, WriteMode};

const DUPLICATE_USERNAME: &str = "A user with that username already exists.";

const ORDERING: &[(&str, employee::Column)] = &[
    ("salary", employee::Column::SalaryCents),
    ("first_name", employee::Column::FirstName),
    ("last_name", employee::Column::LastName),
    ("username", employee::Column::Username),
];

/// Employee as exposed over the API. The password hash never leaves the crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmployeeView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub salary: Option<Money>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTimeWithTimeZone,
    pub last_login: Option<DateTimeWithTimeZone>,
}

impl From<employee::Model> for EmployeeView {
    fn from(model: employee::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            department: model.department,
            position: model.position,
            phone: model.phone,
            salary: model.salary_cents.map(Money::from_cents),
            is_active: model.is_active,
            is_superuser: model.is_superuser,
            date_joined: model.date_joined,
            last_login: model.last_login,
        }
    }
}

/// `username` is only read on create; `password` is optional on update.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EmployeeInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub salary: Option<Money>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EmployeeQuery {
    pub department: Option<String>,
    pub position: Option<String>,
    pub is_active: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn apply_input(active: &mut employee::ActiveModel, input: EmployeeInput, mode: WriteMode) -> ApiResult<()> {
    let mut errors = FieldErrors::new();

    if mode == WriteMode::Create {
        if let Some(username) = validate::username(&mut errors, input.username.as_deref()) {
            active.username = Set(username);
        }
        if let Some(password) = new_password(&mut errors, "password", input.password.as_deref()) {
            active.password_hash = Set(hash(&password)?);
        }
    } else if input.password.is_some() {
        if let Some(password) = new_password(&mut errors, "password", input.password.as_deref()) {
            active.password_hash = Set(hash(&password)?);
        }
    }
    if mode.touches(input.email.is_some()) {
        if let Some(email) = validate::required_email(&mut errors, "email", input.email.as_deref()) {
            active.email = Set(email);
        }
    }
    if mode.touches(input.first_name.is_some()) {
        active.first_name = Set(
            validate::optional_text(&mut errors, "first_name", input.first_name, 150).unwrap_or_default(),
        );
    }
    if mode.touches(input.last_name.is_some()) {
        active.last_name = Set(
            validate::optional_text(&mut errors, "last_name", input.last_name, 150).unwrap_or_default(),
        );
    }
    if mode.touches(input.department.is_some()) {
        active.department = Set(validate::optional_text(&mut errors, "department", input.department, 100));
    }
    if mode.touches(input.position.is_some()) {
        active.position = Set(validate::optional_text(&mut errors, "position", input.position, 100));
    }
    if mode.touches(input.phone.is_some()) {
        active.phone = Set(validate::phone(&mut errors, input.phone));
    }
    if mode.touches(input.salary.is_some()) {
        active.salary_cents =
            Set(validate::non_negative_money(&mut errors, "salary", input.salary).map(Money::cents));
    }
    match input.is_active {
        Some(is_active) => active.is_active = Set(is_active),
        None if mode != WriteMode::Patch => active.is_active = Set(true),
        None => {}
    }

    errors.into_result()
}

async fn find_employee(db: &DbPool, id: i32) -> ApiResult<employee::Model> {
    employee::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found(format!("Employee {id} not found.")))
}

#[instrument(skip(db, params))]
pub async fn list_employees(db: &DbPool, params: &EmployeeQuery) -> ApiResult<Vec<EmployeeView>> {
    let page = Page::new(params.limit, params.offset)?;
    let ordering = query::ordering(params.ordering.as_deref(), ORDERING)?;

    let mut select = employee::Entity::find();
    if let Some(department) = query::clean(params.department.as_deref()) {
        select = select.filter(employee::Column::Department.eq(department));
    }
    if let Some(position) = query::clean(params.position.as_deref()) {
        select = select.filter(employee::Column::Position.eq(position));
    }
    if let Some(is_active) = query::parse_bool("is_active", params.is_active.as_deref())? {
        select = select.filter(employee::Column::IsActive.eq(is_active));
    }
    if let Some(condition) = query::search(
        params.search.as_deref(),
        &[
            employee::Column::Username,
            employee::Column::FirstName,
            employee::Column::LastName,
            employee::Column::Email,
        ],
    ) {
        select = select.filter(condition);
    }
    let select = query::order(
        select,
        ordering,
        (employee::Column::Username, Order::Asc),
        employee::Column::Id,
    );
    let rows = page.apply(select).all(db).await.map_err(db_error)?;
    Ok(rows.into_iter().map(EmployeeView::from).collect())
}

#[instrument(skip(db, input))]
pub async fn create_employee(db: &DbPool, input: EmployeeInput) -> ApiResult<EmployeeView> {
    let mut active = employee::ActiveModel {
        is_superuser: Set(false),
        date_joined: Set(Utc::now().into()),
        last_login: Set(None),
        ..Default::default()
    };
    apply_input(&mut active, input, WriteMode::Create)?;
    let model = active
        .insert(db)
        .await
        .map_err(db_error_or_conflict(DUPLICATE_USERNAME))?;
    tracing::info!(employee_id = model.id, "employee created");
    Ok(model.into())
}

#[instrument(skip(db))]
pub async fn get_employee(db: &DbPool, id: i32) -> ApiResult<EmployeeView> {
    find_employee(db, id).await.map(EmployeeView::from)
}

#[instrument(skip(db, input))]
pub async fn update_employee(
    db: &DbPool,
    id: i32,
    input: EmployeeInput,
    mode: WriteMode,
) -> ApiResult<EmployeeView> {
    let existing = find_employee(db, id).await?;
    let mut active: employee::ActiveModel = existing.into();
    apply_input(&mut active, input, mode)?;
    let model = active.update(db).await.map_err(db_error)?;
    Ok(model.into())
}

#[instrument(skip(db))]
pub async fn delete_employee(db: &DbPool, id: i32) -> ApiResult<()> {
    let result = employee::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(db_error)?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(format!("Employee {id} not found.")));
    }
    tracing::info!(employee_id = id, "employee deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_ignored_on_update() {
        let mut active = <employee::ActiveModel as Default>::default();
        let input = EmployeeInput {
            username: Some("renamed".into()),
            department: Some("Sales".into()),
            ..EmployeeInput::default()
        };
        apply_input(&mut active, input, WriteMode::Patch).unwrap();
        assert!(active.username.is_not_set());
        assert!(active.password_hash.is_not_set());
        assert_eq!(active.department, Set(Some("Sales".to_string())));
    }

    #[test]
    fn create_needs_password_and_rejects_negative_salary() {
        let mut active = <employee::ActiveModel as Default>::default();
        let input = EmployeeInput {
            username: Some("jdoe".into()),
            email: Some("jdoe@acme.io".into()),
            salary: Some(Money::from_cents(-100)),
            ..EmployeeInput::default()
        };
        let Err(ApiError::Validation(fields)) = apply_input(&mut active, input, WriteMode::Create)
        else {
            panic!("expected validation error");
        };
        assert!(fields.contains("password"));
        assert!(fields.contains("salary"));
        assert!(!fields.contains("username"));
    }

    #[test]
    fn view_never_exposes_password_hash() {
        let now = Utc::now().into();
        let view = EmployeeView::from(employee::Model {
            id: 1,
            username: "jdoe".into(),
            email: "jdoe@acme.io".into(),
            password_hash: "$argon2id$secret".into(),
            first_name: String::new(),
            last_name: String::new(),
            department: None,
            position: None,
            phone: None,
            salary_cents: Some(420_000),
            is_active: true,
            is_superuser: false,
            date_joined: now,
            last_login: None,
        });
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains(r#""salary":"4200.00""#));
    }
}
