//! Sales CRM services.
//!
//! Every operation takes the connection pool explicitly and returns
//! [`platform_api::ApiResult`], so the HTTP layer only parses requests and
//! shapes responses.

pub mod access;
pub mod conversion;
pub mod customers;
pub mod employees;
pub mod invoices;
pub mod leads;
pub mod mail;
pub mod money;
pub mod query;
pub mod scoring;
pub mod seed;
pub mod settings;
pub mod validate;

pub use access::AccessConfig;
pub use mail::{LogMailer, Mailer, OutgoingMail};
pub use money::Money;
pub use scoring::{HttpLeadScorer, LeadFeatures, LeadScorer, ScoredExample, ScoringError, UnconfiguredScorer};
pub use seed::{SeededRecords, seed_demo};
pub use validate::WriteMode;
