use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "lead")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub company_name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub status: Status,
    pub score: f64,
    pub industry: Option<String>,
    pub employee_count: Option<i32>,
    pub budget_estimate: Option<f64>,
    pub country: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(indexed)]
    pub assigned_to: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::AssignedTo",
        to = "super::employee::Column::Id",
        on_delete = "SetNull"
    )]
    AssignedEmployee,
    #[sea_orm(has_one = "super::customer::Entity")]
    Customer,
}

impl Related<super::employee::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssignedEmployee.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

#[derive(
    Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum Status {
    #[default]
    #[sea_orm(string_value = "New")]
    New,
    #[sea_orm(string_value = "Contacted")]
    Contacted,
    #[sea_orm(string_value = "Qualified")]
    Qualified,
    #[sea_orm(string_value = "Unqualified")]
    Unqualified,
}

impl ActiveModelBehavior for ActiveModel {}
