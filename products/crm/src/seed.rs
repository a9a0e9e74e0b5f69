//! Demo data for local development. Safe to run repeatedly: rows are looked
//! up by their unique keys before being inserted.

use chrono::{NaiveDate, Utc};
use entity::{customer, employee, invoice, invoice_item, lead};
use platform_authn::hash_password;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
    prelude::DateTimeWithTimeZone,
};
use tracing::instrument;

use crate::settings;

pub const ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Clone)]
pub struct SeededRecords {
    pub admin: employee::Model,
    pub leads: Vec<lead::Model>,
    pub customer: customer::Model,
    pub invoice: invoice::Model,
    pub items: Vec<invoice_item::Model>,
}

impl SeededRecords {
    pub fn lead_named(&self, company_name: &str) -> Option<&lead::Model> {
        self.leads.iter().find(|lead| lead.company_name == company_name)
    }
}

struct SeedLead {
    company_name: &'static str,
    email: &'static str,
    industry: &'static str,
    employee_count: i32,
    budget_estimate: f64,
    country: &'static str,
    source: &'static str,
    status: lead::Status,
}

const SEED_LEADS: [SeedLead; 3] = [
    SeedLead {
        company_name: "Acme Robotics",
        email: "procurement@acme-robotics.test",
        industry: "Manufacturing",
        employee_count: 420,
        budget_estimate: 85_000.0,
        country: "United States",
        source: "Website",
        status: lead::Status::New,
    },
    SeedLead {
        company_name: "Blue Fjord Shipping",
        email: "it@bluefjord.test",
        industry: "Transportation",
        employee_count: 95,
        budget_estimate: 22_000.0,
        country: "Norway",
        source: "Referral",
        status: lead::Status::Contacted,
    },
    SeedLead {
        company_name: "Greenleaf Clinics",
        email: "office@greenleaf.test",
        industry: "Healthcare",
        employee_count: 38,
        budget_estimate: 9_500.0,
        country: "Canada",
        source: "Trade show",
        status: lead::Status::New,
    },
];

#[instrument(name = "crm.seed", skip_all)]
pub async fn seed_demo(db: &DatabaseConnection, admin_password: &str) -> Result<SeededRecords, DbErr> {
    settings::get_settings(db)
        .await
        .map_err(|err| DbErr::Custom(format!("settings: {err}")))?;
    let seeded_at: DateTimeWithTimeZone = Utc::now().into();
    let admin = ensure_admin(db, admin_password, seeded_at).await?;

    let mut leads = Vec::with_capacity(SEED_LEADS.len());
    for seed in &SEED_LEADS {
        let existing = lead::Entity::find()
            .filter(lead::Column::Email.eq(seed.email))
            .one(db)
            .await?;
        let model = match existing {
            Some(model) => model,
            None => {
                lead::ActiveModel {
                    company_name: Set(seed.company_name.into()),
                    email: Set(seed.email.into()),
                    phone: Set(None),
                    source: Set(Some(seed.source.into())),
                    status: Set(seed.status),
                    score: Set(0.0),
                    industry: Set(Some(seed.industry.into())),
                    employee_count: Set(Some(seed.employee_count)),
                    budget_estimate: Set(Some(seed.budget_estimate)),
                    country: Set(Some(seed.country.into())),
                    description: Set(None),
                    assigned_to: Set(Some(admin.id)),
                    created_at: Set(seeded_at),
                    ..Default::default()
                }
                .insert(db)
                .await?
            }
        };
        leads.push(model);
    }

    let customer = match customer::Entity::find()
        .filter(customer::Column::Email.eq("billing@northwind.test"))
        .one(db)
        .await?
    {
        Some(model) => model,
        None => {
            customer::ActiveModel {
                company_name: Set("Northwind Traders".into()),
                email: Set("billing@northwind.test".into()),
                phone: Set(Some("+1-555-0142".into())),
                address: Set(Some("1 Harbour Way, Seattle, WA".into())),
                industry: Set(Some("Wholesale".into())),
                country: Set(Some("United States".into())),
                contact_person: Set("Nancy Davolio".into()),
                converted_from_lead: Set(None),
                joined_at: Set(seeded_at),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };

    let invoice = match invoice::Entity::find()
        .filter(invoice::Column::InvoiceNumber.eq("INV-0001"))
        .one(db)
        .await?
    {
        Some(model) => model,
        None => {
            invoice::ActiveModel {
                invoice_number: Set("INV-0001".into()),
                customer_id: Set(customer.id),
                total_amount_cents: Set(2 * 1_000 + 500),
                status: Set(invoice::Status::Sent),
                due_date: Set(NaiveDate::from_ymd_opt(2025, 12, 31)),
                created_by: Set(Some(admin.id)),
                created_at: Set(seeded_at),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };
    let mut items = invoice_item::Entity::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice.id))
        .order_by_asc(invoice_item::Column::Id)
        .all(db)
        .await?;
    if items.is_empty() {
        for (description, quantity, unit_price_cents) in
            [("CRM seat licence", 2, 1_000), ("Onboarding call", 1, 500)]
        {
            let item = invoice_item::ActiveModel {
                invoice_id: Set(invoice.id),
                description: Set(description.into()),
                quantity: Set(quantity),
                unit_price_cents: Set(unit_price_cents),
                ..Default::default()
            }
            .insert(db)
            .await?;
            items.push(item);
        }
    }

    tracing::info!(
        admin_id = admin.id,
        leads = leads.len(),
        customer_id = customer.id,
        invoice_id = invoice.id,
        "demo data ready"
    );
    Ok(SeededRecords {
        admin,
        leads,
        customer,
        invoice,
        items,
    })
}

async fn ensure_admin(
    db: &DatabaseConnection,
    password: &str,
    seeded_at: DateTimeWithTimeZone,
) -> Result<employee::Model, DbErr> {
    if let Some(existing) = employee::Entity::find()
        .filter(employee::Column::Username.eq(ADMIN_USERNAME))
        .one(db)
        .await?
    {
        return Ok(existing);
    }
    let password_hash =
        hash_password(password).map_err(|err| DbErr::Custom(format!("hash error: {err}")))?;
    employee::ActiveModel {
        username: Set(ADMIN_USERNAME.into()),
        email: Set("admin@sales-crm.test".into()),
        password_hash: Set(password_hash),
        first_name: Set("Ada".into()),
        last_name: Set("Admin".into()),
        department: Set(Some("Management".into())),
        position: Set(Some("Administrator".into())),
        phone: Set(None),
        salary_cents: Set(None),
        is_active: Set(true),
        is_superuser: Set(true),
        date_joined: Set(seeded_at),
        last_login: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
}
