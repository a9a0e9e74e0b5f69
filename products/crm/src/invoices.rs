//! Invoices and their line items.
//!
//! Every item is validated before anything is written, and an invoice is
//! stored together with its items in one transaction: either the whole
//! document lands or nothing does.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use entity::{customer, invoice, invoice_item};
use platform_api::{ApiError, ApiResult, FieldErrors};
use platform_db::{DbPool, db_error, db_error_or_conflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait, prelude::DateTimeWithTimeZone,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::money::Money;
use crate::query::{self, Page};
use crate::validate::{self, WriteMode};

const DUPLICATE_NUMBER: &str = "invoice with this invoice number already exists.";

pub const STATUS_CHOICES: &[(&str, invoice::Status)] = &[
    ("DRAFT", invoice::Status::Draft),
    ("SENT", invoice::Status::Sent),
    ("PAID", invoice::Status::Paid),
    ("OVERDUE", invoice::Status::Overdue),
];

const ORDERING: &[(&str, invoice::Column)] = &[
    ("created_at", invoice::Column::CreatedAt),
    ("due_date", invoice::Column::DueDate),
    ("total_amount", invoice::Column::TotalAmountCents),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoiceItemView {
    pub id: i32,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Money,
    pub total: Money,
}

impl From<invoice_item::Model> for InvoiceItemView {
    fn from(model: invoice_item::Model) -> Self {
        Self {
            id: model.id,
            total: Money::from_cents(model.total_cents()),
            description: model.description,
            quantity: model.quantity,
            unit_price: Money::from_cents(model.unit_price_cents),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    pub id: i32,
    pub invoice_number: String,
    pub customer: i32,
    pub total_amount: Money,
    pub status: invoice::Status,
    pub due_date: Option<NaiveDate>,
    pub created_by: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
    pub items: Vec<InvoiceItemView>,
}

impl InvoiceView {
    fn new(model: invoice::Model, items: Vec<invoice_item::Model>) -> Self {
        Self {
            id: model.id,
            invoice_number: model.invoice_number,
            customer: model.customer_id,
            total_amount: Money::from_cents(model.total_amount_cents),
            status: model.status,
            due_date: model.due_date,
            created_by: model.created_by,
            created_at: model.created_at,
            items: items.into_iter().map(InvoiceItemView::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InvoiceItemInput {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InvoiceInput {
    pub invoice_number: Option<String>,
    pub customer: Option<i32>,
    pub total_amount: Option<Money>,
    pub status: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// On update, a present list replaces every stored item.
    pub items: Option<Vec<InvoiceItemInput>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub status: Option<String>,
    pub customer: Option<i32>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ValidItem {
    description: String,
    quantity: i32,
    unit_price: Money,
}

fn validate_item(input: &InvoiceItemInput) -> Result<ValidItem, FieldErrors> {
    let mut errors = FieldErrors::new();
    let description = validate::required_text(&mut errors, "description", input.description.as_deref(), 255);
    let quantity = match input.quantity {
        None => {
            errors.add("quantity", validate::REQUIRED);
            None
        }
        Some(quantity) if quantity < 1 => {
            errors.add("quantity", "Ensure this value is greater than or equal to 1.");
            None
        }
        Some(quantity) => match i32::try_from(quantity) {
            Ok(quantity) => Some(quantity),
            Err(_) => {
                errors.add("quantity", "Ensure this value is less than or equal to 2147483647.");
                None
            }
        },
    };
    if input.unit_price.is_none() {
        errors.add("unit_price", validate::REQUIRED);
    }
    let unit_price = validate::non_negative_money(&mut errors, "unit_price", input.unit_price);
    match (description, quantity, unit_price) {
        (Some(description), Some(quantity), Some(unit_price)) if errors.is_empty() => Ok(ValidItem {
            description,
            quantity,
            unit_price,
        }),
        _ => Err(errors),
    }
}

/// Validate every item, keying failures as `items[i].field`.
fn validate_items(errors: &mut FieldErrors, items: &[InvoiceItemInput]) -> Option<Vec<ValidItem>> {
    let mut valid = Vec::with_capacity(items.len());
    let mut failed = false;
    for (index, item) in items.iter().enumerate() {
        match validate_item(item) {
            Ok(item) => valid.push(item),
            Err(item_errors) => {
                failed = true;
                errors.merge_prefixed(&format!("items[{index}]"), item_errors);
            }
        }
    }
    (!failed).then_some(valid)
}

fn items_total(errors: &mut FieldErrors, items: &[ValidItem]) -> Option<Money> {
    let total = items.iter().try_fold(Money::ZERO, |sum, item| {
        item.unit_price
            .checked_mul(i64::from(item.quantity))
            .and_then(|line| sum.checked_add(line))
    });
    if total.is_none() {
        errors.add("items", "Invoice total is too large.");
    }
    total
}

async fn ensure_customer<C: ConnectionTrait>(db: &C, errors: &mut FieldErrors, id: i32) -> ApiResult<()> {
    let exists = customer::Entity::find_by_id(id)
        .count(db)
        .await
        .map_err(db_error)?
        > 0;
    if !exists {
        errors.add("customer", format!("Invalid pk \"{id}\" - object does not exist."));
    }
    Ok(())
}

async fn insert_items(txn: &DatabaseTransaction, invoice_id: i32, items: Vec<ValidItem>) -> ApiResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    let rows = items.into_iter().map(|item| invoice_item::ActiveModel {
        invoice_id: Set(invoice_id),
        description: Set(item.description),
        quantity: Set(item.quantity),
        unit_price_cents: Set(item.unit_price.cents()),
        ..Default::default()
    });
    invoice_item::Entity::insert_many(rows)
        .exec(txn)
        .await
        .map_err(db_error)?;
    Ok(())
}

async fn load_items<C: ConnectionTrait>(db: &C, invoice_id: i32) -> ApiResult<Vec<invoice_item::Model>> {
    invoice_item::Entity::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_item::Column::Id)
        .all(db)
        .await
        .map_err(db_error)
}

async fn find_invoice<C: ConnectionTrait>(db: &C, id: i32) -> ApiResult<invoice::Model> {
    invoice::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found(format!("Invoice {id} not found.")))
}

#[instrument(skip(db, params))]
pub async fn list_invoices(db: &DbPool, params: &InvoiceQuery) -> ApiResult<Vec<InvoiceView>> {
    let page = Page::new(params.limit, params.offset)?;
    let ordering = query::ordering(params.ordering.as_deref(), ORDERING)?;

    let mut select = invoice::Entity::find();
    if let Some(raw) = query::clean(params.status.as_deref()) {
        let mut errors = FieldErrors::new();
        let status = validate::choice(&mut errors, "status", raw, STATUS_CHOICES);
        errors.into_result()?;
        if let Some(status) = status {
            select = select.filter(invoice::Column::Status.eq(status));
        }
    }
    if let Some(customer_id) = params.customer {
        select = select.filter(invoice::Column::CustomerId.eq(customer_id));
    }
    if let Some(condition) = query::search(params.search.as_deref(), &[invoice::Column::InvoiceNumber]) {
        select = select.filter(condition);
    }
    let select = query::order(
        select,
        ordering,
        (invoice::Column::CreatedAt, Order::Desc),
        invoice::Column::Id,
    );
    let invoices = page.apply(select).all(db).await.map_err(db_error)?;

    let ids: Vec<i32> = invoices.iter().map(|invoice| invoice.id).collect();
    let mut items: HashMap<i32, Vec<invoice_item::Model>> = HashMap::new();
    if !ids.is_empty() {
        let rows = invoice_item::Entity::find()
            .filter(invoice_item::Column::InvoiceId.is_in(ids))
            .order_by_asc(invoice_item::Column::Id)
            .all(db)
            .await
            .map_err(db_error)?;
        for row in rows {
            items.entry(row.invoice_id).or_default().push(row);
        }
    }
    Ok(invoices
        .into_iter()
        .map(|invoice| {
            let rows = items.remove(&invoice.id).unwrap_or_default();
            InvoiceView::new(invoice, rows)
        })
        .collect())
}

#[instrument(skip(db, input))]
pub async fn create_invoice(
    db: &DbPool,
    input: InvoiceInput,
    created_by: Option<i32>,
) -> ApiResult<InvoiceView> {
    let mut errors = FieldErrors::new();
    let invoice_number =
        validate::required_text(&mut errors, "invoice_number", input.invoice_number.as_deref(), 50);
    match input.customer {
        Some(customer_id) => ensure_customer(db, &mut errors, customer_id).await?,
        None => errors.add("customer", validate::REQUIRED),
    }
    let status = match input.status.as_deref() {
        Some(raw) => validate::choice(&mut errors, "status", raw, STATUS_CHOICES),
        None => Some(invoice::Status::default()),
    };
    let total_amount = validate::non_negative_money(&mut errors, "total_amount", input.total_amount);
    let items = validate_items(&mut errors, input.items.as_deref().unwrap_or_default());
    let computed = items.as_deref().and_then(|items| items_total(&mut errors, items));
    errors.into_result()?;

    let (Some(invoice_number), Some(customer_id), Some(status), Some(items)) =
        (invoice_number, input.customer, status, items)
    else {
        return Err(ApiError::internal(anyhow::anyhow!("validated invoice fields missing")));
    };
    let total = total_amount.or(computed).unwrap_or(Money::ZERO);

    let txn = db.begin().await.map_err(db_error)?;
    let created = invoice::ActiveModel {
        invoice_number: Set(invoice_number),
        customer_id: Set(customer_id),
        total_amount_cents: Set(total.cents()),
        status: Set(status),
        due_date: Set(input.due_date),
        created_by: Set(created_by),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(db_error_or_conflict(DUPLICATE_NUMBER))?;
    insert_items(&txn, created.id, items).await?;
    let stored_items = load_items(&txn, created.id).await?;
    txn.commit().await.map_err(db_error)?;

    tracing::info!(invoice_id = created.id, items = stored_items.len(), "invoice created");
    Ok(InvoiceView::new(created, stored_items))
}

#[instrument(skip(db))]
pub async fn get_invoice(db: &DbPool, id: i32) -> ApiResult<InvoiceView> {
    let invoice = find_invoice(db, id).await?;
    let items = load_items(db, id).await?;
    Ok(InvoiceView::new(invoice, items))
}

/// PUT or PATCH. A present `items` list replaces the stored items; when no
/// explicit total is given alongside new items the total is recomputed.
#[instrument(skip(db, input))]
pub async fn update_invoice(
    db: &DbPool,
    id: i32,
    input: InvoiceInput,
    mode: WriteMode,
) -> ApiResult<InvoiceView> {
    let txn = db.begin().await.map_err(db_error)?;
    let existing = find_invoice(&txn, id).await?;
    let mut active: invoice::ActiveModel = existing.into();
    let mut errors = FieldErrors::new();

    if mode.touches(input.invoice_number.is_some()) {
        if let Some(number) =
            validate::required_text(&mut errors, "invoice_number", input.invoice_number.as_deref(), 50)
        {
            active.invoice_number = Set(number);
        }
    }
    match input.customer {
        Some(customer_id) => {
            ensure_customer(&txn, &mut errors, customer_id).await?;
            active.customer_id = Set(customer_id);
        }
        None if mode != WriteMode::Patch => errors.add("customer", validate::REQUIRED),
        None => {}
    }
    match input.status.as_deref() {
        Some(raw) => {
            if let Some(status) = validate::choice(&mut errors, "status", raw, STATUS_CHOICES) {
                active.status = Set(status);
            }
        }
        None if mode != WriteMode::Patch => active.status = Set(invoice::Status::default()),
        None => {}
    }
    if mode.touches(input.due_date.is_some()) {
        active.due_date = Set(input.due_date);
    }
    let total_amount = validate::non_negative_money(&mut errors, "total_amount", input.total_amount);
    let items = match input.items.as_deref() {
        Some(items) => validate_items(&mut errors, items),
        None => None,
    };
    let computed = items.as_deref().and_then(|items| items_total(&mut errors, items));
    errors.into_result()?;

    if let Some(total) = total_amount {
        active.total_amount_cents = Set(total.cents());
    } else if let Some(total) = computed {
        active.total_amount_cents = Set(total.cents());
    } else if mode != WriteMode::Patch {
        let stored = load_items(&txn, id).await?;
        let sum = stored.iter().map(invoice_item::Model::total_cents).sum::<i64>();
        active.total_amount_cents = Set(sum);
    }

    let updated = active
        .update(&txn)
        .await
        .map_err(db_error_or_conflict(DUPLICATE_NUMBER))?;
    if let Some(items) = items {
        invoice_item::Entity::delete_many()
            .filter(invoice_item::Column::InvoiceId.eq(id))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        insert_items(&txn, id, items).await?;
    }
    let stored_items = load_items(&txn, id).await?;
    txn.commit().await.map_err(db_error)?;
    Ok(InvoiceView::new(updated, stored_items))
}

#[instrument(skip(db))]
pub async fn delete_invoice(db: &DbPool, id: i32) -> ApiResult<()> {
    let txn = db.begin().await.map_err(db_error)?;
    invoice_item::Entity::delete_many()
        .filter(invoice_item::Column::InvoiceId.eq(id))
        .exec(&txn)
        .await
        .map_err(db_error)?;
    let result = invoice::Entity::delete_by_id(id)
        .exec(&txn)
        .await
        .map_err(db_error)?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(format!("Invoice {id} not found.")));
    }
    txn.commit().await.map_err(db_error)?;
    tracing::info!(invoice_id = id, "invoice deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str, quantity: i64, unit_price: &str) -> InvoiceItemInput {
        InvoiceItemInput {
            description: Some(description.into()),
            quantity: Some(quantity),
            unit_price: Some(unit_price.parse().unwrap()),
        }
    }

    #[test]
    fn item_errors_are_keyed_by_position() {
        let mut errors = FieldErrors::new();
        let items = vec![
            item("Onboarding", 1, "100.00"),
            item("", 0, "5.00"),
            InvoiceItemInput::default(),
        ];
        assert!(validate_items(&mut errors, &items).is_none());
        assert!(!errors.contains("items[0].description"));
        assert!(errors.contains("items[1].description"));
        assert!(errors.contains("items[1].quantity"));
        assert!(errors.contains("items[2].unit_price"));
    }

    #[test]
    fn totals_follow_quantity_and_price() {
        let mut errors = FieldErrors::new();
        let items = validate_items(
            &mut errors,
            &[item("Licences", 2, "10.00"), item("Support", 1, "5.00")],
        )
        .unwrap();
        assert_eq!(items_total(&mut errors, &items), Some(Money::from_cents(2500)));
        assert!(errors.is_empty());
    }

    #[test]
    fn item_view_computes_line_total() {
        let view = InvoiceItemView::from(invoice_item::Model {
            id: 1,
            invoice_id: 1,
            description: "Licences".into(),
            quantity: 2,
            unit_price_cents: 1000,
        });
        assert_eq!(view.total.to_string(), "20.00");
    }
}
