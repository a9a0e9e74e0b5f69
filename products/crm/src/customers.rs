use chrono::Utc;
use entity::customer;
use platform_api::{ApiError, ApiResult, FieldErrors};
use platform_db::{DbPool, db_error, db_error_or_conflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, Set,
    prelude::DateTimeWithTimeZone,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::query::{self, Page};
use crate::validate::{self, WriteMode};

pub(crate) const DUPLICATE_EMAIL: &str = "customer with this email already exists.";

const ORDERING: &[(&str, customer::Column)] = &[
    ("joined_at", customer::Column::JoinedAt),
    ("company_name", customer::Column::CompanyName),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerView {
    pub id: i32,
    pub company_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub contact_person: String,
    pub converted_from_lead: Option<i32>,
    pub joined_at: DateTimeWithTimeZone,
}

impl From<customer::Model> for CustomerView {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            company_name: model.company_name,
            email: model.email,
            phone: model.phone,
            address: model.address,
            industry: model.industry,
            country: model.country,
            contact_person: model.contact_person,
            converted_from_lead: model.converted_from_lead,
            joined_at: model.joined_at,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CustomerInput {
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub contact_person: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub industry: Option<String>,
    pub country: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn apply_input(active: &mut customer::ActiveModel, input: CustomerInput, mode: WriteMode) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    if mode.touches(input.company_name.is_some()) {
        if let Some(name) =
            validate::required_text(&mut errors, "company_name", input.company_name.as_deref(), 255)
        {
            active.company_name = Set(name);
        }
    }
    if mode.touches(input.email.is_some()) {
        if let Some(email) = validate::required_email(&mut errors, "email", input.email.as_deref()) {
            active.email = Set(email);
        }
    }
    if mode.touches(input.phone.is_some()) {
        active.phone = Set(validate::phone(&mut errors, input.phone));
    }
    if mode.touches(input.address.is_some()) {
        active.address = Set(input
            .address
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()));
    }
    if mode.touches(input.industry.is_some()) {
        active.industry = Set(validate::optional_text(&mut errors, "industry", input.industry, 100));
    }
    if mode.touches(input.country.is_some()) {
        active.country = Set(validate::optional_text(&mut errors, "country", input.country, 100));
    }
    if mode.touches(input.contact_person.is_some()) {
        active.contact_person = Set(validate::optional_text(
            &mut errors,
            "contact_person",
            input.contact_person,
            255,
        )
        .unwrap_or_default());
    }
    errors.into_result()
}

pub(crate) async fn find_customer<C: ConnectionTrait>(db: &C, id: i32) -> ApiResult<customer::Model> {
    customer::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found(format!("Customer {id} not found.")))
}

#[instrument(skip(db, params))]
pub async fn list_customers(db: &DbPool, params: &CustomerQuery) -> ApiResult<Vec<CustomerView>> {
    let page = Page::new(params.limit, params.offset)?;
    let ordering = query::ordering(params.ordering.as_deref(), ORDERING)?;

    let mut select = customer::Entity::find();
    if let Some(industry) = query::clean(params.industry.as_deref()) {
        select = select.filter(customer::Column::Industry.eq(industry));
    }
    if let Some(country) = query::clean(params.country.as_deref()) {
        select = select.filter(customer::Column::Country.eq(country));
    }
    if let Some(condition) = query::search(
        params.search.as_deref(),
        &[
            customer::Column::CompanyName,
            customer::Column::ContactPerson,
            customer::Column::Email,
        ],
    ) {
        select = select.filter(condition);
    }
    let select = query::order(
        select,
        ordering,
        (customer::Column::JoinedAt, Order::Desc),
        customer::Column::Id,
    );
    let rows = page.apply(select).all(db).await.map_err(db_error)?;
    Ok(rows.into_iter().map(CustomerView::from).collect())
}

#[instrument(skip(db, input))]
pub async fn create_customer(db: &DbPool, input: CustomerInput) -> ApiResult<CustomerView> {
    let mut active = customer::ActiveModel {
        converted_from_lead: Set(None),
        joined_at: Set(Utc::now().into()),
        ..Default::default()
    };
    apply_input(&mut active, input, WriteMode::Create)?;
    let model = active
        .insert(db)
        .await
        .map_err(db_error_or_conflict(DUPLICATE_EMAIL))?;
    tracing::info!(customer_id = model.id, "customer created");
    Ok(model.into())
}

#[instrument(skip(db))]
pub async fn get_customer(db: &DbPool, id: i32) -> ApiResult<CustomerView> {
    find_customer(db, id).await.map(CustomerView::from)
}

#[instrument(skip(db, input))]
pub async fn update_customer(
    db: &DbPool,
    id: i32,
    input: CustomerInput,
    mode: WriteMode,
) -> ApiResult<CustomerView> {
    let existing = find_customer(db, id).await?;
    let mut active: customer::ActiveModel = existing.into();
    apply_input(&mut active, input, mode)?;
    let model = active
        .update(db)
        .await
        .map_err(db_error_or_conflict(DUPLICATE_EMAIL))?;
    Ok(model.into())
}

#[instrument(skip(db))]
pub async fn delete_customer(db: &DbPool, id: i32) -> ApiResult<()> {
    let result = customer::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(db_error)?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(format!("Customer {id} not found.")));
    }
    tracing::info!(customer_id = id, "customer deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_person_defaults_to_empty() {
        let mut active = <customer::ActiveModel as Default>::default();
        let input = CustomerInput {
            company_name: Some("Acme".into()),
            email: Some("ops@acme.io".into()),
            ..CustomerInput::default()
        };
        apply_input(&mut active, input, WriteMode::Create).unwrap();
        assert_eq!(active.contact_person, Set(String::new()));
        assert_eq!(active.address, Set(None));
    }

    #[test]
    fn invalid_email_is_reported_per_field() {
        let mut active = <customer::ActiveModel as Default>::default();
        let input = CustomerInput {
            company_name: Some("Acme".into()),
            email: Some("not-an-email".into()),
            ..CustomerInput::default()
        };
        let Err(ApiError::Validation(fields)) = apply_input(&mut active, input, WriteMode::Create)
        else {
            panic!("expected validation error");
        };
        assert!(fields.contains("email"));
        assert!(!fields.contains("company_name"));
    }
}
