//! sea-orm models for every table of the sales CRM.

pub mod auth_token;
pub mod customer;
pub mod employee;
pub mod invoice;
pub mod invoice_item;
pub mod lead;
pub mod settings;
