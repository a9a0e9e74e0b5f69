use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Lead {
    Table,
    Id,
    CompanyName,
    Email,
    Phone,
    Source,
    Status,
    Score,
    Industry,
    EmployeeCount,
    BudgetEstimate,
    Country,
    Description,
    AssignedTo,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Customer {
    Table,
    Id,
    CompanyName,
    Email,
    Phone,
    Address,
    Industry,
    Country,
    ContactPerson,
    ConvertedFromLead,
    JoinedAt,
}

#[derive(DeriveIden)]
enum Employee {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Lead::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Lead::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Lead::CompanyName).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Lead::Email)
                            .string_len(254)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Lead::Phone).string_len(20))
                    .col(ColumnDef::new(Lead::Source).string_len(255))
                    .col(
                        ColumnDef::new(Lead::Status)
                            .string_len(32)
                            .not_null()
                            .default("New"),
                    )
                    .col(ColumnDef::new(Lead::Score).double().not_null().default(0.0))
                    .col(ColumnDef::new(Lead::Industry).string_len(255))
                    .col(ColumnDef::new(Lead::EmployeeCount).integer())
                    .col(ColumnDef::new(Lead::BudgetEstimate).double())
                    .col(ColumnDef::new(Lead::Country).string_len(255))
                    .col(ColumnDef::new(Lead::Description).text())
                    .col(ColumnDef::new(Lead::AssignedTo).integer())
                    .col(
                        ColumnDef::new(Lead::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lead_assigned_to")
                            .from(Lead::Table, Lead::AssignedTo)
                            .to(Employee::Table, Employee::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, col) in [
            ("idx_lead_status", Lead::Status),
            ("idx_lead_assigned_to", Lead::AssignedTo),
            ("idx_lead_created_at", Lead::CreatedAt),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(Lead::Table)
                        .col(col)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Customer::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Customer::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Customer::CompanyName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customer::Email)
                            .string_len(254)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Customer::Phone).string_len(20))
                    .col(ColumnDef::new(Customer::Address).text())
                    .col(ColumnDef::new(Customer::Industry).string_len(255))
                    .col(ColumnDef::new(Customer::Country).string_len(255))
                    .col(
                        ColumnDef::new(Customer::ContactPerson)
                            .string_len(255)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Customer::ConvertedFromLead)
                            .integer()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Customer::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_lead")
                            .from(Customer::Table, Customer::ConvertedFromLead)
                            .to(Lead::Table, Lead::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_customer_company_name")
                    .table(Customer::Table)
                    .col(Customer::CompanyName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Customer::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Lead::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
