use chrono::{DateTime, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};
use usage_census::domain::model::Category;
use usage_census::{
    CensusConfig, CensusEngine, CensusError, CodaWebhook, DeliveryOutcome, IntercomClient,
    RunMode, RunRequest, SyntheticDirectory,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn config_for(server: &MockServer) -> CensusConfig {
    let mut config = CensusConfig::default();
    config.intercom.base_url = server.base_url();
    config.intercom.per_page = 2;
    config.retry.max_retries = 2;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.webhook.retry_delay_ms = 1;
    config.tagging.batch_delay_ms = 0;
    config
}

fn contact(id: &str, email: &str, external_id: &str, attribute: &str, value: &str) -> Value {
    json!({
        "type": "contact",
        "id": id,
        "role": "user",
        "email": email,
        "external_id": external_id,
        "last_seen_at": now().timestamp() - 7_200,
        "tags": {"type": "list", "data": []},
        "custom_attributes": {attribute: value},
    })
}

fn request(mode: RunMode, tag_profiles: bool) -> RunRequest {
    RunRequest {
        recency_days: 7,
        mode,
        tag_profiles,
    }
}

#[tokio::test]
async fn test_end_to_end_census_with_paginated_feed() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;

    let first_page = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/contacts/search")
                .body_contains("\"per_page\":2}");
            then.status(200).json_body(json!({
                "type": "list",
                "data": [
                    contact("1", "a@x.com", "1001", "lsat_course", "basic"),
                    contact("2", "b@x.com", "usr_2", "sub", "pro"),
                ],
                "pages": {"next": {"starting_after": "cursor-2"}}
            }));
        })
        .await;
    let second_page = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/contacts/search")
                .body_contains("\"starting_after\":\"cursor-2\"");
            then.status(200).json_body(json!({
                "type": "list",
                "data": [
                    contact("3", "C@x.com", "1003", "lsat_course", "basic"),
                    contact("4", "c@x.com", "usr_4", "sub", "basic"),
                ],
                "pages": {"next": null}
            }));
        })
        .await;
    let webhook = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/coda/hook")
                .header("authorization", "Bearer coda-token")
                .body_contains("\"total_unique_emails\":3");
            then.status(200);
        })
        .await;

    let config = config_for(&server);
    let directory = IntercomClient::new(&config, "intercom-token")?;
    let sink = CodaWebhook::new(server.url("/coda/hook"), "coda-token", &config.webhook)?;
    let engine = CensusEngine::new(directory, sink, config);

    let outcome = engine.run_at(now(), request(RunMode::Live, false)).await?;

    first_page.assert_async().await;
    second_page.assert_async().await;
    webhook.assert_async().await;
    assert!(outcome.delivery.is_delivered());

    let census = &outcome.report.report;
    assert_eq!(census.total_unique_emails, 3);
    assert_eq!(census.total_profiles_in_window, 4);
    assert_eq!(census.emails_with_multiple_profiles, 1);

    let only_a = census.categories.get(Category::OnlyA);
    let only_b = census.categories.get(Category::OnlyB);
    let both = census.categories.get(Category::Both);
    assert_eq!(only_a.count, 1);
    assert_eq!(only_a.subscription_breakdown["basic"].total(), 1);
    assert_eq!(only_b.count, 1);
    assert_eq!(only_b.subscription_breakdown["pro"].total(), 1);
    assert_eq!(both.count, 1);
    assert_eq!(both.subscription_breakdown["basic"].total(), 1);
    assert_eq!(both.sample, vec!["c@x.com".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_feed_retry_exhaustion_aborts_without_delivery() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;

    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/contacts/search");
            then.status(503).header("Retry-After", "0");
        })
        .await;
    let webhook = server
        .mock_async(|when, then| {
            when.method(POST).path("/coda/hook");
            then.status(200);
        })
        .await;

    let config = config_for(&server);
    let directory = IntercomClient::new(&config, "intercom-token")?;
    let sink = CodaWebhook::new(server.url("/coda/hook"), "coda-token", &config.webhook)?;
    let engine = CensusEngine::new(directory, sink, config);

    let err = engine
        .run_at(now(), request(RunMode::Live, false))
        .await
        .unwrap_err();

    search.assert_hits_async(3).await;
    webhook.assert_hits_async(0).await;
    assert!(matches!(err, CensusError::RetryExhausted { attempts: 3, .. }));
    assert_eq!(err.exit_code(), 2);

    Ok(())
}

#[tokio::test]
async fn test_webhook_failure_is_retried_once_and_not_fatal() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;

    let webhook = server
        .mock_async(|when, then| {
            when.method(POST).path("/coda/hook");
            then.status(500).body("coda is down");
        })
        .await;

    let config = config_for(&server);
    let directory = SyntheticDirectory::new(&config.classification).with_population(12);
    let sink = CodaWebhook::new(server.url("/coda/hook"), "coda-token", &config.webhook)?;
    let engine = CensusEngine::new(directory, sink, config);

    let outcome = engine.run_at(now(), request(RunMode::Test, false)).await?;

    webhook.assert_hits_async(2).await;
    match outcome.delivery {
        DeliveryOutcome::Failed { attempts, error } => {
            assert_eq!(attempts, 2);
            assert!(error.to_string().contains("500"));
            assert_eq!(error.exit_code(), 0);
        }
        other => panic!("unexpected delivery outcome: {other:?}"),
    }
    assert!(outcome.report.report.total_unique_emails > 0);

    Ok(())
}

#[tokio::test]
async fn test_tagging_only_touches_platform_a_only_profiles() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/contacts/search");
            then.status(200).json_body(json!({
                "type": "list",
                "data": [
                    contact("a-1", "a@x.com", "1001", "lsat_course", "core"),
                    contact("b-1", "b@x.com", "usr_2", "sub", "core"),
                    contact("c-1", "c@x.com", "1003", "lsat_course", "live"),
                    contact("c-2", "c@x.com", "usr_3", "sub", "live"),
                ]
            }));
        })
        .await;
    let tag = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tags")
                .json_body(json!({
                    "name": "Recently Active on 7S1 Only",
                    "users": [{"id": "a-1"}]
                }));
            then.status(200).json_body(json!({"type": "tag", "id": "42"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/coda/hook");
            then.status(200);
        })
        .await;

    let config = config_for(&server);
    let directory = IntercomClient::new(&config, "intercom-token")?;
    let sink = CodaWebhook::new(server.url("/coda/hook"), "coda-token", &config.webhook)?;
    let engine = CensusEngine::new(directory, sink, config);

    let outcome = engine.run_at(now(), request(RunMode::Live, true)).await?;

    tag.assert_async().await;
    let tagging = outcome
        .report
        .tagging_results
        .expect("tagging results present");
    assert_eq!(tagging.total_profiles_to_tag, 1);
    assert_eq!(tagging.successfully_tagged, 1);
    assert_eq!(tagging.failed_batches, 0);

    Ok(())
}
