use ark_ec::AffineRepr as _;
use http::StatusCode;
use randsrv_core::oprf::{self, Affine, mappings};
use randsrv_types::{
    EpochId, Tag,
    api::{
        EpochStatus, ErrorKind, ErrorResponse, EvaluationRequest, EvaluationResponse,
        InfoResponse, PunctureRequest,
    },
    crypto,
};

use crate::setup::{ADMIN_TOKEN, TEST_TAG, TEST_TIMEOUT, TestService, blinded, request};


fn assert_error(
    response: &axum_test::TestResponse,
    status: StatusCode,
    kind: ErrorKind,
    epoch: Option<EpochId>,
) {
    response.assert_status(status);
    let error = response.json::<ErrorResponse>();
    assert_eq!(error.kind, kind, "{}", error.message);
    assert_eq!(error.epoch, epoch);
}

#[tokio::test]
async fn test_health_and_ready() -> eyre::Result<()> {
    let service = TestService::start();
    service.wait_until_ready().await?;
    let result = service.server.get("/health").await;
    result.assert_status_ok();
    result.assert_text("healthy");
    assert_eq!(result.header("cache-control"), "no-cache");

    let result = service.server.get("/ready").await;
    result.assert_status_ok();
    result.assert_text("ready");
    Ok(())
}

#[tokio::test]
async fn test_not_ready() -> eyre::Result<()> {
    let service = TestService::start();
    let _not_started_service = service.started_services.new_service();
    let result = service.server.get("/ready").await;
    result.assert_status_service_unavailable();
    result.assert_text("starting");
    Ok(())
}

#[tokio::test]
async fn test_version_and_root() -> eyre::Result<()> {
    let service = TestService::start();
    let result = service.server.get("/version").await;
    result.assert_status_ok();
    result.assert_text(randsrv_service::version_info());

    let result = service.server.get("/").await;
    result.assert_status_ok();
    result.assert_text("randsrv randomness server");
    Ok(())
}

#[tokio::test]
async fn test_info() -> eyre::Result<()> {
    let service = TestService::start();
    let result = service.server.get("/info").await;
    result.assert_status_ok();
    assert_eq!(result.header("cache-control"), "no-cache");
    let info = result.json::<InfoResponse>();
    assert_eq!(info.current_epoch, EpochId::new(1));
    assert_eq!(info.max_points, 4);
    let current = service.key_store.lookup(EpochId::new(1))?;
    assert_eq!(&info.public_key, current.public_key());
    assert!(humantime::parse_rfc3339(&info.next_epoch_time).is_ok());

    // wire names are camelCase
    let raw = result.json::<serde_json::Value>();
    assert!(raw.get("currentEpoch").is_some());
    assert!(raw.get("nextEpochTime").is_some());

    service.rotate();
    let info = service.server.get("/info").await.json::<InfoResponse>();
    assert_eq!(info.current_epoch, EpochId::new(2));
    Ok(())
}

#[tokio::test]
async fn test_happy_path() -> eyre::Result<()> {
    let service = TestService::start();
    let untagged = service.randomness_for(b"some input", "", None).await;
    let tagged = service.randomness_for(b"some input", TEST_TAG, None).await;
    assert_ne!(untagged, tagged);

    // blinding does not influence the output
    assert_eq!(
        service.randomness_for(b"some input", "", None).await,
        untagged
    );
    assert_ne!(
        service.randomness_for(b"other input", "", None).await,
        untagged
    );
    Ok(())
}

#[tokio::test]
async fn test_batch_keeps_order() -> eyre::Result<()> {
    let service = TestService::start();
    let inputs: [&[u8]; 3] = [b"a", b"b", b"c"];
    let blindings = inputs
        .iter()
        .map(|input| oprf::client::blind(input, &mut rand::thread_rng()))
        .collect::<Vec<_>>();
    let queries = blindings.iter().map(|(query, _)| query).collect::<Vec<_>>();
    let response = service
        .evaluate_raw(&request(&queries, TEST_TAG, None))
        .await;
    response.assert_status_ok();
    let response = response.json::<EvaluationResponse>();
    assert_eq!(response.results.len(), inputs.len());

    for ((input, (query, blinding_factor)), result) in
        inputs.iter().zip(blindings.clone()).zip(response.results)
    {
        let output = service
            .verify_and_finalize(
                input,
                TEST_TAG,
                response.epoch,
                &query,
                result,
                blinding_factor,
            )
            .await;
        assert_eq!(
            output,
            service.randomness_for(input, TEST_TAG, None).await
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_rejects_unknown_tag() -> eyre::Result<()> {
    let service = TestService::start();
    let response = service.evaluate(&blinded(b"input"), "unknown", None).await;
    assert_error(
        &response,
        StatusCode::BAD_REQUEST,
        ErrorKind::UnknownTag,
        Some(EpochId::new(1)),
    );
    Ok(())
}

#[tokio::test]
async fn test_rejects_malformed_points() -> eyre::Result<()> {
    let service = TestService::start();
    let query = blinded(b"input");
    let valid = crypto::encode_point(&query.blinded_query());

    let cases = [
        "not base64!".to_owned(),
        "AAAA".to_owned(),
        crypto::encode_point(&Affine::zero()),
    ];
    for invalid in cases {
        let response = service
            .evaluate_raw(&EvaluationRequest {
                points: vec![valid.clone(), invalid],
                tag: Tag::untagged(),
                epoch: None,
            })
            .await;
        assert_error(
            &response,
            StatusCode::BAD_REQUEST,
            ErrorKind::MalformedInput,
            None,
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_rejects_invalid_bodies() -> eyre::Result<()> {
    let service = TestService::start();
    let response = service
        .server
        .post("/randomness")
        .text("{\"points\": ")
        .content_type("application/json")
        .await;
    assert_error(
        &response,
        StatusCode::BAD_REQUEST,
        ErrorKind::MalformedInput,
        None,
    );

    let response = service
        .server
        .post("/randomness")
        .json(&serde_json::json!({ "points": "nope" }))
        .await;
    assert_error(
        &response,
        StatusCode::BAD_REQUEST,
        ErrorKind::MalformedInput,
        None,
    );
    Ok(())
}

#[tokio::test]
async fn test_rejects_too_many_points() -> eyre::Result<()> {
    let service = TestService::start();
    let query = blinded(b"input");
    let response = service
        .evaluate_raw(&request(&[&query; 5], "", None))
        .await;
    assert_error(
        &response,
        StatusCode::BAD_REQUEST,
        ErrorKind::TooManyPoints,
        None,
    );

    let response = service.evaluate_raw(&request(&[], "", None)).await;
    response.assert_status_ok();
    assert!(response.json::<EvaluationResponse>().results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_epoch_lifecycle() -> eyre::Result<()> {
    let service = TestService::start();
    let query = oprf::BlindedOprfRequest::try_new(mappings::hash_to_curve(b"input"))?;

    let (epoch, first) = service
        .evaluate_ok(&query, TEST_TAG, Some(EpochId::new(1)))
        .await;
    assert_eq!(epoch, EpochId::new(1));

    assert_eq!(service.rotate(), EpochId::new(2));
    let (epoch, again) = service
        .evaluate_ok(&query, TEST_TAG, Some(EpochId::new(1)))
        .await;
    assert_eq!(epoch, EpochId::new(1));
    assert_eq!(again, first);

    // retention of two epochs
    assert_eq!(service.rotate(), EpochId::new(3));
    service
        .evaluate_ok(&query, TEST_TAG, Some(EpochId::new(1)))
        .await;
    assert_eq!(service.rotate(), EpochId::new(4));
    let response = service
        .evaluate(&query, TEST_TAG, Some(EpochId::new(1)))
        .await;
    assert_error(
        &response,
        StatusCode::GONE,
        ErrorKind::PuncturedEpoch,
        Some(EpochId::new(1)),
    );

    let (epoch, current) = service.evaluate_ok(&query, TEST_TAG, None).await;
    assert_eq!(epoch, EpochId::new(4));
    assert_ne!(current.point, first.point);

    let response = service
        .evaluate(&query, TEST_TAG, Some(EpochId::new(99)))
        .await;
    assert_error(
        &response,
        StatusCode::NOT_FOUND,
        ErrorKind::UnknownEpoch,
        Some(EpochId::new(99)),
    );

    let public_keys = service.public_keys().await;
    let statuses = public_keys
        .iter()
        .map(|info| (info.epoch.into_inner(), info.status))
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            (1, EpochStatus::Punctured),
            (2, EpochStatus::Retained),
            (3, EpochStatus::Retained),
            (4, EpochStatus::Current),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_admin_puncture() -> eyre::Result<()> {
    let service = TestService::start_with_admin();
    let query = blinded(b"input");
    let tag_request = PunctureRequest {
        epoch: EpochId::new(1),
        tag: Some(Tag::from(TEST_TAG)),
    };

    let response = service
        .server
        .post("/admin/puncture")
        .json(&tag_request)
        .await;
    assert_error(
        &response,
        StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized,
        None,
    );
    let response = service
        .server
        .post("/admin/puncture")
        .authorization_bearer("wrong")
        .json(&tag_request)
        .await;
    assert_error(
        &response,
        StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized,
        None,
    );
    // nothing happened
    service.evaluate_ok(&query, TEST_TAG, None).await;

    for _ in 0..2 {
        service
            .server
            .post("/admin/puncture")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&tag_request)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
    let response = service.evaluate(&query, TEST_TAG, None).await;
    assert_error(
        &response,
        StatusCode::GONE,
        ErrorKind::PuncturedEpoch,
        Some(EpochId::new(1)),
    );
    // the untagged component is unaffected
    service.evaluate_ok(&query, "", None).await;
    let info = &service.public_keys().await[0];
    assert_eq!(info.punctured_tags, vec![Tag::from(TEST_TAG)]);

    // puncturing the whole current epoch moves on to the next one, on the same schedule
    let next_epoch_time = service
        .server
        .get("/info")
        .await
        .json::<InfoResponse>()
        .next_epoch_time;
    service
        .server
        .post("/admin/puncture")
        .authorization_bearer(ADMIN_TOKEN)
        .json(&PunctureRequest {
            epoch: EpochId::new(1),
            tag: None,
        })
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let (epoch, _) = service.evaluate_ok(&query, TEST_TAG, None).await;
    assert_eq!(epoch, EpochId::new(2));
    let info = service.server.get("/info").await.json::<InfoResponse>();
    assert_eq!(info.current_epoch, EpochId::new(2));
    assert_eq!(info.next_epoch_time, next_epoch_time);

    let response = service
        .server
        .post("/admin/puncture")
        .authorization_bearer(ADMIN_TOKEN)
        .json(&PunctureRequest {
            epoch: EpochId::new(42),
            tag: None,
        })
        .await;
    assert_error(
        &response,
        StatusCode::NOT_FOUND,
        ErrorKind::UnknownEpoch,
        Some(EpochId::new(42)),
    );
    Ok(())
}

#[tokio::test]
async fn test_admin_disabled_without_token() -> eyre::Result<()> {
    let service = TestService::start();
    service
        .server
        .post("/admin/puncture")
        .authorization_bearer(ADMIN_TOKEN)
        .json(&PunctureRequest {
            epoch: EpochId::new(1),
            tag: None,
        })
        .await
        .assert_status_not_found();
    service.evaluate_ok(&blinded(b"input"), "", None).await;
    Ok(())
}

#[tokio::test]
async fn test_starts_at_largest_first_epoch() -> eyre::Result<()> {
    let service = TestService::start_with_args(&["--first-epoch", "9223372036854775807"]);
    assert_eq!(service.key_store.current_epoch(), EpochId::MAX_FIRST);
    assert_eq!(service.rotate(), EpochId::new(EpochId::MAX_FIRST.into_inner() + 1));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_if_cancellation_token_cancelled() -> eyre::Result<()> {
    let service = TestService::start();
    service.wait_until_ready().await?;
    service.cancellation_token.cancel();
    tokio::time::timeout(TEST_TIMEOUT, service.epoch_scheduler).await???;
    Ok(())
}
