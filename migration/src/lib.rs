pub use sea_orm_migration::prelude::*;

mod m20250301_000001_employees;
mod m20250301_000002_leads_customers;
mod m20250301_000003_invoices;
mod m20250301_000004_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_employees::Migration),
            Box::new(m20250301_000002_leads_customers::Migration),
            Box::new(m20250301_000003_invoices::Migration),
            Box::new(m20250301_000004_settings::Migration),
        ]
    }
}
