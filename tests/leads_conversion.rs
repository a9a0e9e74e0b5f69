use anyhow::Result;
use entity::lead;
use platform_api::ApiError;
use products_crm::{
    conversion,
    customers::{self, CustomerInput, CustomerQuery},
    employees,
    employees::EmployeeInput,
    leads::{self, LeadInput, LeadQuery},
    scoring,
};
use suite_tests::{FailingScorer, StubScorer, memory_db};

fn lead_input(company: &str, email: &str) -> LeadInput {
    LeadInput {
        company_name: Some(company.into()),
        email: Some(email.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn duplicate_lead_email_is_a_conflict() -> Result<()> {
    let db = memory_db().await?;
    leads::create_lead(&db, lead_input("Acme", "sales@acme.test")).await?;

    let err = leads::create_lead(&db, lead_input("Acme Two", "SALES@acme.test"))
        .await
        .expect_err("duplicate email must be rejected");
    assert!(matches!(err, ApiError::Conflict(ref msg) if msg.contains("already exists")));
    assert_eq!(leads::list_leads(&db, &LeadQuery::default()).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn conversion_copies_lead_fields_and_qualifies_the_lead() -> Result<()> {
    let db = memory_db().await?;
    let lead = leads::create_lead(
        &db,
        LeadInput {
            phone: Some("+47 555 0100".into()),
            industry: Some("Shipping".into()),
            country: Some("Norway".into()),
            ..lead_input("Blue Fjord", "it@bluefjord.test")
        },
    )
    .await?;

    let customer = conversion::convert_lead(&db, lead.id).await?;
    assert_eq!(customer.company_name, "Blue Fjord");
    assert_eq!(customer.email, "it@bluefjord.test");
    assert_eq!(customer.phone.as_deref(), Some("+47 555 0100"));
    assert_eq!(customer.industry.as_deref(), Some("Shipping"));
    assert_eq!(customer.country.as_deref(), Some("Norway"));
    assert_eq!(customer.contact_person, "");
    assert_eq!(customer.converted_from_lead, Some(lead.id));

    let reloaded = leads::get_lead(&db, lead.id).await?;
    assert_eq!(reloaded.status, lead::Status::Qualified);
    Ok(())
}

#[tokio::test]
async fn a_lead_converts_only_once() -> Result<()> {
    let db = memory_db().await?;
    let lead = leads::create_lead(&db, lead_input("Acme", "sales@acme.test")).await?;
    conversion::convert_lead(&db, lead.id).await?;

    let err = conversion::convert_lead(&db, lead.id)
        .await
        .expect_err("second conversion must fail");
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = conversion::convert_lead(&db, lead.id + 100)
        .await
        .expect_err("unknown lead");
    assert!(matches!(err, ApiError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn scoring_a_bare_lead_sends_defaults_and_persists() -> Result<()> {
    let db = memory_db().await?;
    let lead = leads::create_lead(&db, lead_input("Corner Shop", "owner@corner.test")).await?;
    let scorer = StubScorer::returning(42.5);

    let result = scoring::score_lead(&db, &scorer, lead.id).await?;
    assert_eq!(result.score, 42.5);
    assert_eq!(leads::get_lead(&db, lead.id).await?.score, 42.5);

    let requests = scorer.requests();
    assert_eq!(requests.len(), 1);
    let (features, examples) = &requests[0];
    assert_eq!(features.company_name, "Corner Shop");
    assert_eq!(features.industry, "");
    assert_eq!(features.employee_count, 0);
    assert_eq!(features.budget_estimate, 0.0);
    assert_eq!(*examples, scoring::reference_examples().len());
    Ok(())
}

#[tokio::test]
async fn converted_leads_are_not_rescored() -> Result<()> {
    let db = memory_db().await?;
    let lead = leads::create_lead(&db, lead_input("Acme", "sales@acme.test")).await?;
    conversion::convert_lead(&db, lead.id).await?;
    let scorer = StubScorer::returning(90.0);

    let err = scoring::score_lead(&db, &scorer, lead.id)
        .await
        .expect_err("converted lead");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("lead")));
    assert!(scorer.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn assignment_requires_an_active_employee() -> Result<()> {
    let db = memory_db().await?;
    let lead = leads::create_lead(&db, lead_input("Acme", "sales@acme.test")).await?;
    let active = employees::create_employee(
        &db,
        EmployeeInput {
            username: Some("rep".into()),
            email: Some("rep@crm.test".into()),
            password: Some("correct-horse-42".into()),
            is_active: Some(true),
            ..Default::default()
        },
    )
    .await?;
    let inactive = employees::create_employee(
        &db,
        EmployeeInput {
            username: Some("gone".into()),
            email: Some("gone@crm.test".into()),
            password: Some("correct-horse-42".into()),
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await?;

    let assigned = leads::assign_lead(&db, lead.id, Some(active.id)).await?;
    assert_eq!(assigned.assigned_to.map(|a| a.username), Some("rep".to_string()));

    let err = leads::assign_lead(&db, lead.id, Some(inactive.id))
        .await
        .expect_err("inactive employee");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("employee_id")));

    let err = leads::assign_lead(&db, lead.id, Some(9_999))
        .await
        .expect_err("missing employee");
    assert!(matches!(err, ApiError::Validation(_)));

    let cleared = leads::assign_lead(&db, lead.id, None).await?;
    assert!(cleared.assigned_to.is_none());

    let mine = leads::list_leads(
        &db,
        &LeadQuery {
            assigned_to: Some(active.id),
            ..Default::default()
        },
    )
    .await?;
    assert!(mine.is_empty());
    Ok(())
}

#[tokio::test]
async fn statistics_average_only_scored_leads() -> Result<()> {
    let db = memory_db().await?;
    let a = leads::create_lead(&db, lead_input("A", "a@a.test")).await?;
    let b = leads::create_lead(&db, lead_input("B", "b@b.test")).await?;
    leads::create_lead(&db, lead_input("C", "c@c.test")).await?;
    scoring::score_lead(&db, &StubScorer::returning(80.0), a.id).await?;
    scoring::score_lead(&db, &StubScorer::returning(50.0), b.id).await?;
    conversion::convert_lead(&db, a.id).await?;

    let stats = leads::lead_statistics(&db).await?;
    assert_eq!(stats.total_leads, 3);
    assert_eq!(stats.total_customers, 1);
    assert_eq!(stats.average_score, 65.0);

    let high = leads::list_leads(
        &db,
        &LeadQuery {
            min_score: Some(60.0),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(high.iter().map(|l| l.id).collect::<Vec<_>>(), vec![a.id]);

    let ordered = leads::list_leads(
        &db,
        &LeadQuery {
            ordering: Some("-score".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(ordered.first().map(|l| l.id), Some(a.id));
    Ok(())
}

#[tokio::test]
async fn scorer_failure_is_upstream_and_keeps_the_score() -> Result<()> {
    let db = memory_db().await?;
    let lead = leads::create_lead(&db, lead_input("Acme", "sales@acme.test")).await?;

    let err = scoring::score_lead(&db, &FailingScorer, lead.id)
        .await
        .expect_err("scorer is down");
    assert!(matches!(err, ApiError::Upstream(_)));
    assert_eq!(err.status().as_u16(), 400);
    assert_eq!(err.code(), "UPSTREAM");
    assert_eq!(leads::get_lead(&db, lead.id).await?.score, 0.0);
    Ok(())
}

#[tokio::test]
async fn phone_numbers_longer_than_the_column_are_rejected() -> Result<()> {
    let db = memory_db().await?;
    let long_phone = "+1 (555) 010-0100 x99";
    assert_eq!(long_phone.chars().count(), 21);

    let err = leads::create_lead(
        &db,
        LeadInput {
            phone: Some(long_phone.into()),
            ..lead_input("Acme", "sales@acme.test")
        },
    )
    .await
    .expect_err("lead phone too long");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("phone")));
    assert_eq!(err.code(), "INVALID_INPUT");

    let err = customers::create_customer(
        &db,
        CustomerInput {
            company_name: Some("Acme".into()),
            email: Some("ap@acme.test".into()),
            phone: Some(long_phone.into()),
            ..Default::default()
        },
    )
    .await
    .expect_err("customer phone too long");
    assert!(matches!(err, ApiError::Validation(ref fields) if fields.contains("phone")));

    let lead = leads::create_lead(
        &db,
        LeadInput {
            phone: Some("+1 (555) 010-0100 x9".into()),
            ..lead_input("Acme", "sales@acme.test")
        },
    )
    .await?;
    assert_eq!(lead.phone.as_deref(), Some("+1 (555) 010-0100 x9"));
    Ok(())
}

#[tokio::test]
async fn search_treats_wildcards_literally() -> Result<()> {
    let db = memory_db().await?;
    let literal = leads::create_lead(&db, lead_input("50% Off Outlet", "deals@outlet.test")).await?;
    leads::create_lead(&db, lead_input("500 Corp", "info@500corp.test")).await?;
    leads::create_lead(&db, lead_input("Ab Trading", "ab@trading.test")).await?;

    let found = leads::list_leads(
        &db,
        &LeadQuery {
            search: Some("50%".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(found.iter().map(|l| l.id).collect::<Vec<_>>(), vec![literal.id]);

    let underscored = leads::list_leads(
        &db,
        &LeadQuery {
            search: Some("a_".into()),
            ..Default::default()
        },
    )
    .await?;
    assert!(underscored.is_empty());

    customers::create_customer(
        &db,
        CustomerInput {
            company_name: Some("500 Corp".into()),
            email: Some("ap@500corp.test".into()),
            ..Default::default()
        },
    )
    .await?;
    let customers = customers::list_customers(
        &db,
        &CustomerQuery {
            search: Some("50%".into()),
            ..Default::default()
        },
    )
    .await?;
    assert!(customers.is_empty());
    Ok(())
}
