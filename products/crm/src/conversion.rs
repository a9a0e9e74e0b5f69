//! Lead → customer conversion.
//!
//! The customer copies the lead's identity fields and keeps a back-reference.
//! The lead itself stays on file with its status forced to `Qualified`; the
//! unique `converted_from_lead` column guarantees one customer per lead even
//! under concurrent requests.

use chrono::Utc;
use entity::{customer, lead};
use platform_api::{ApiError, ApiResult};
use platform_db::{DbPool, db_error, is_unique_violation};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::Deserialize;
use tracing::instrument;

use crate::customers::{CustomerView, DUPLICATE_EMAIL};
use crate::leads::find_lead;

const ALREADY_CONVERTED: &str = "This lead has already been converted.";

#[derive(Clone, Debug, Deserialize)]
pub struct ConvertRequest {
    pub lead_id: Option<i32>,
}

impl ConvertRequest {
    pub fn lead_id(&self) -> ApiResult<i32> {
        self.lead_id
            .ok_or_else(|| ApiError::invalid("lead_id", crate::validate::REQUIRED))
    }
}

#[instrument(skip(db))]
pub async fn convert_lead(db: &DbPool, lead_id: i32) -> ApiResult<CustomerView> {
    let txn = db.begin().await.map_err(db_error)?;

    let lead = find_lead(&txn, lead_id).await?;
    let existing = customer::Entity::find()
        .filter(customer::Column::ConvertedFromLead.eq(lead_id))
        .one(&txn)
        .await
        .map_err(db_error)?;
    if existing.is_some() {
        return Err(ApiError::conflict(ALREADY_CONVERTED));
    }

    let created = customer::ActiveModel {
        company_name: Set(lead.company_name.clone()),
        email: Set(lead.email.clone()),
        phone: Set(lead.phone.clone()),
        address: Set(None),
        industry: Set(lead.industry.clone()),
        country: Set(lead.country.clone()),
        contact_person: Set(String::new()),
        converted_from_lead: Set(Some(lead.id)),
        joined_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|err| {
        if !is_unique_violation(&err) {
            return db_error(err);
        }
        if err.to_string().contains("converted_from_lead") {
            ApiError::conflict(ALREADY_CONVERTED)
        } else {
            ApiError::conflict(DUPLICATE_EMAIL)
        }
    })?;

    let mut active: lead::ActiveModel = lead.into();
    active.status = Set(lead::Status::Qualified);
    active.update(&txn).await.map_err(db_error)?;

    txn.commit().await.map_err(db_error)?;
    tracing::info!(lead_id, customer_id = created.id, "lead converted");
    Ok(created.into())
}
