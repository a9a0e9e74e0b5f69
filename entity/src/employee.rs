use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "employee")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(indexed)]
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub salary_cents: Option<i64>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTimeWithTimeZone,
    pub last_login: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    AuthToken,
    AssignedLead,
    CreatedInvoice,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::AuthToken => Entity::has_one(super::auth_token::Entity).into(),
            Relation::AssignedLead => Entity::has_many(super::lead::Entity).into(),
            Relation::CreatedInvoice => Entity::has_many(super::invoice::Entity).into(),
        }
    }
}

impl Related<super::auth_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuthToken.def()
    }
}

impl Related<super::lead::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssignedLead.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreatedInvoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
