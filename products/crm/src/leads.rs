//! Lead records: CRUD, filtering, assignment and pipeline statistics.

use std::collections::HashMap;

use chrono::Utc;
use entity::{customer, employee, lead};
use platform_api::{ApiError, ApiResult, FieldErrors};
use platform_db::{DbPool, db_error, db_error_or_conflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QuerySelect, Set, prelude::DateTimeWithTimeZone,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::query::{self, Page};
use crate::validate::{self, WriteMode};

const DUPLICATE_EMAIL: &str = "lead with this email already exists.";

pub const STATUS_CHOICES: &[(&str, lead::Status)] = &[
    ("New", lead::Status::New),
    ("Contacted", lead::Status::Contacted),
    ("Qualified", lead::Status::Qualified),
    ("Unqualified", lead::Status::Unqualified),
];

const ORDERING: &[(&str, lead::Column)] = &[
    ("created_at", lead::Column::CreatedAt),
    ("score", lead::Column::Score),
    ("budget_estimate", lead::Column::BudgetEstimate),
    ("company_name", lead::Column::CompanyName),
];

/// Short employee reference embedded in lead payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssigneeView {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&employee::Model> for AssigneeView {
    fn from(model: &employee::Model) -> Self {
        Self {
            id: model.id,
            username: model.username.clone(),
            first_name: model.first_name.clone(),
            last_name: model.last_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeadView {
    pub id: i32,
    pub company_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub status: lead::Status,
    pub score: f64,
    pub industry: Option<String>,
    pub employee_count: Option<i32>,
    pub budget_estimate: Option<f64>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<AssigneeView>,
    pub created_at: DateTimeWithTimeZone,
}

impl LeadView {
    fn new(model: lead::Model, assignee: Option<AssigneeView>) -> Self {
        Self {
            id: model.id,
            company_name: model.company_name,
            email: model.email,
            phone: model.phone,
            source: model.source,
            status: model.status,
            score: model.score,
            industry: model.industry,
            employee_count: model.employee_count,
            budget_estimate: model.budget_estimate,
            country: model.country,
            description: model.description,
            assigned_to: assignee,
            created_at: model.created_at,
        }
    }
}

/// Writable lead fields. `score` and `assigned_to` have their own operations.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LeadInput {
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i64>,
    pub budget_estimate: Option<f64>,
    pub country: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LeadQuery {
    pub status: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub assigned_to: Option<i32>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeadStatistics {
    pub total_leads: u64,
    pub total_customers: u64,
    pub average_score: f64,
}

fn apply_input(active: &mut lead::ActiveModel, input: LeadInput, mode: WriteMode) -> ApiResult<()> {
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
    if mode.touches(input.source.is_some()) {
        active.source = Set(validate::optional_text(&mut errors, "source", input.source, 100));
    }
    match input.status.as_deref() {
        Some(raw) => {
            if let Some(status) = validate::choice(&mut errors, "status", raw, STATUS_CHOICES) {
                active.status = Set(status);
            }
        }
        None if mode != WriteMode::Patch => active.status = Set(lead::Status::default()),
        None => {}
    }
    if mode.touches(input.industry.is_some()) {
        active.industry = Set(validate::optional_text(&mut errors, "industry", input.industry, 100));
    }
    if mode.touches(input.employee_count.is_some()) {
        active.employee_count = Set(validate::non_negative_count(
            &mut errors,
            "employee_count",
            input.employee_count,
        ));
    }
    if mode.touches(input.budget_estimate.is_some()) {
        active.budget_estimate = Set(validate::non_negative_float(
            &mut errors,
            "budget_estimate",
            input.budget_estimate,
        ));
    }
    if mode.touches(input.country.is_some()) {
        active.country = Set(validate::optional_text(&mut errors, "country", input.country, 100));
    }
    if mode.touches(input.description.is_some()) {
        active.description = Set(input
            .description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()));
    }

    errors.into_result()
}

/// Attach assignee summaries, loading every referenced employee in one query.
pub(crate) async fn lead_views<C: ConnectionTrait>(
    db: &C,
    leads: Vec<lead::Model>,
) -> ApiResult<Vec<LeadView>> {
    let mut ids: Vec<i32> = leads.iter().filter_map(|lead| lead.assigned_to).collect();
    ids.sort_unstable();
    ids.dedup();
    let assignees: HashMap<i32, AssigneeView> = if ids.is_empty() {
        HashMap::new()
    } else {
        employee::Entity::find()
            .filter(employee::Column::Id.is_in(ids))
            .all(db)
            .await
            .map_err(db_error)?
            .iter()
            .map(|model| (model.id, AssigneeView::from(model)))
            .collect()
    };
    Ok(leads
        .into_iter()
        .map(|lead| {
            let assignee = lead.assigned_to.and_then(|id| assignees.get(&id).cloned());
            LeadView::new(lead, assignee)
        })
        .collect())
}

pub(crate) async fn lead_view<C: ConnectionTrait>(db: &C, lead: lead::Model) -> ApiResult<LeadView> {
    let mut views = lead_views(db, vec![lead]).await?;
    views
        .pop()
        .ok_or_else(|| ApiError::internal(anyhow::anyhow!("lead view vanished")))
}

pub(crate) async fn find_lead<C: ConnectionTrait>(db: &C, id: i32) -> ApiResult<lead::Model> {
    lead::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found(format!("Lead {id} not found.")))
}

#[instrument(skip(db, params), fields(search = params.search.is_some()))]
pub async fn list_leads(db: &DbPool, params: &LeadQuery) -> ApiResult<Vec<LeadView>> {
    let page = Page::new(params.limit, params.offset)?;
    let ordering = query::ordering(params.ordering.as_deref(), ORDERING)?;

    let mut select = lead::Entity::find();
    if let Some(raw) = query::clean(params.status.as_deref()) {
        let mut errors = FieldErrors::new();
        let status = validate::choice(&mut errors, "status", raw, STATUS_CHOICES);
        errors.into_result()?;
        if let Some(status) = status {
            select = select.filter(lead::Column::Status.eq(status));
        }
    }
    if let Some(industry) = query::clean(params.industry.as_deref()) {
        select = select.filter(lead::Column::Industry.eq(industry));
    }
    if let Some(country) = query::clean(params.country.as_deref()) {
        select = select.filter(lead::Column::Country.eq(country));
    }
    if let Some(employee_id) = params.assigned_to {
        select = select.filter(lead::Column::AssignedTo.eq(employee_id));
    }
    if let Some(min) = params.min_score {
        select = select.filter(lead::Column::Score.gte(min));
    }
    if let Some(max) = params.max_score {
        select = select.filter(lead::Column::Score.lte(max));
    }
    if let Some(condition) = query::search(
        params.search.as_deref(),
        &[
            lead::Column::CompanyName,
            lead::Column::Industry,
            lead::Column::Description,
        ],
    ) {
        select = select.filter(condition);
    }

    let select = query::order(
        select,
        ordering,
        (lead::Column::CreatedAt, Order::Desc),
        lead::Column::Id,
    );
    let rows = page.apply(select).all(db).await.map_err(db_error)?;
    lead_views(db, rows).await
}

#[instrument(skip(db, input))]
pub async fn create_lead(db: &DbPool, input: LeadInput) -> ApiResult<LeadView> {
    let mut active = lead::ActiveModel {
        score: Set(0.0),
        assigned_to: Set(None),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };
    apply_input(&mut active, input, WriteMode::Create)?;
    let model = active
        .insert(db)
        .await
        .map_err(db_error_or_conflict(DUPLICATE_EMAIL))?;
    tracing::info!(lead_id = model.id, "lead created");
    lead_view(db, model).await
}

#[instrument(skip(db))]
pub async fn get_lead(db: &DbPool, id: i32) -> ApiResult<LeadView> {
    let model = find_lead(db, id).await?;
    lead_view(db, model).await
}

/// PUT when `mode` is [`WriteMode::Replace`], PATCH when [`WriteMode::Patch`].
#[instrument(skip(db, input))]
pub async fn update_lead(db: &DbPool, id: i32, input: LeadInput, mode: WriteMode) -> ApiResult<LeadView> {
    let existing = find_lead(db, id).await?;
    let mut active: lead::ActiveModel = existing.into();
    apply_input(&mut active, input, mode)?;
    let model = active
        .update(db)
        .await
        .map_err(db_error_or_conflict(DUPLICATE_EMAIL))?;
    lead_view(db, model).await
}

#[instrument(skip(db))]
pub async fn delete_lead(db: &DbPool, id: i32) -> ApiResult<()> {
    let result = lead::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(db_error)?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(format!("Lead {id} not found.")));
    }
    tracing::info!(lead_id = id, "lead deleted");
    Ok(())
}

/// Point a lead at an active employee, or clear the assignment with `None`.
#[instrument(skip(db))]
pub async fn assign_lead(db: &DbPool, id: i32, employee_id: Option<i32>) -> ApiResult<LeadView> {
    let existing = find_lead(db, id).await?;
    if let Some(employee_id) = employee_id {
        let employee = employee::Entity::find_by_id(employee_id)
            .one(db)
            .await
            .map_err(db_error)?;
        match employee {
            Some(employee) if employee.is_active => {}
            Some(_) => {
                return Err(ApiError::invalid("employee_id", "Employee is inactive."));
            }
            None => {
                return Err(ApiError::invalid(
                    "employee_id",
                    format!("Invalid pk \"{employee_id}\" - object does not exist."),
                ));
            }
        }
    }
    let mut active: lead::ActiveModel = existing.into();
    active.assigned_to = Set(employee_id);
    let model = active.update(db).await.map_err(db_error)?;
    tracing::info!(lead_id = id, assigned_to = ?employee_id, "lead assignment changed");
    lead_view(db, model).await
}

#[instrument(skip(db))]
pub async fn lead_statistics(db: &DbPool) -> ApiResult<LeadStatistics> {
    let total_leads = lead::Entity::find().count(db).await.map_err(db_error)?;
    let total_customers = customer::Entity::find().count(db).await.map_err(db_error)?;
    let scores: Vec<f64> = lead::Entity::find()
        .select_only()
        .column(lead::Column::Score)
        .filter(lead::Column::Score.ne(0.0))
        .into_tuple()
        .all(db)
        .await
        .map_err(db_error)?;
    Ok(LeadStatistics {
        total_leads,
        total_customers,
        average_score: average(&scores),
    })
}

fn average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_rounds_to_two_places() {
        assert_eq!(average(&[]), 0.0);
        assert_eq!(average(&[10.0, 20.0, 20.0]), 16.67);
    }

    #[test]
    fn create_requires_name_and_email() {
        let mut active = <lead::ActiveModel as Default>::default();
        let err = apply_input(&mut active, LeadInput::default(), WriteMode::Create).unwrap_err();
        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.contains("company_name"));
        assert!(fields.contains("email"));
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let mut active = <lead::ActiveModel as Default>::default();
        let input = LeadInput {
            industry: Some("Logistics".into()),
            ..LeadInput::default()
        };
        apply_input(&mut active, input, WriteMode::Patch).unwrap();
        assert!(active.company_name.is_not_set());
        assert!(active.status.is_not_set());
        assert_eq!(active.industry, Set(Some("Logistics".to_string())));
    }

    #[test]
    fn status_is_matched_case_insensitively() {
        let mut active = <lead::ActiveModel as Default>::default();
        let input = LeadInput {
            status: Some("contacted".into()),
            ..LeadInput::default()
        };
        apply_input(&mut active, input, WriteMode::Patch).unwrap();
        assert_eq!(active.status, Set(lead::Status::Contacted));

        let input = LeadInput {
            status: Some("Won".into()),
            ..LeadInput::default()
        };
        assert!(apply_input(&mut active, input, WriteMode::Patch).is_err());
    }
}
