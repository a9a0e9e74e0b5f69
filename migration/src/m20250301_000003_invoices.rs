use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Invoice {
    Table,
    Id,
    InvoiceNumber,
    CustomerId,
    TotalAmountCents,
    Status,
    DueDate,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum InvoiceItem {
    Table,
    Id,
    InvoiceId,
    Description,
    Quantity,
    UnitPriceCents,
}

#[derive(DeriveIden)]
enum Customer {
    Table,
    Id,
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
                    .table(Invoice::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoice::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Invoice::InvoiceNumber)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Invoice::CustomerId).integer().not_null())
                    .col(
                        ColumnDef::new(Invoice::TotalAmountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Invoice::Status)
                            .string_len(16)
                            .not_null()
                            .default("DRAFT"),
                    )
                    .col(ColumnDef::new(Invoice::DueDate).date())
                    .col(ColumnDef::new(Invoice::CreatedBy).integer())
                    .col(
                        ColumnDef::new(Invoice::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_customer")
                            .from(Invoice::Table, Invoice::CustomerId)
                            .to(Customer::Table, Customer::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_created_by")
                            .from(Invoice::Table, Invoice::CreatedBy)
                            .to(Employee::Table, Employee::Id)
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
                    .name("idx_invoice_customer")
                    .table(Invoice::Table)
                    .col(Invoice::CustomerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InvoiceItem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceItem::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InvoiceItem::InvoiceId).integer().not_null())
                    .col(
                        ColumnDef::new(InvoiceItem::Description)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceItem::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(InvoiceItem::UnitPriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_item_invoice")
                            .from(InvoiceItem::Table, InvoiceItem::InvoiceId)
                            .to(Invoice::Table, Invoice::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invoice_item_invoice")
                    .table(InvoiceItem::Table)
                    .col(InvoiceItem::InvoiceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceItem::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoice::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
