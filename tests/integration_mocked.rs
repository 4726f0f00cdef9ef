/// Integration tests with mocked external APIs
/// Tests webhook delivery, geolocation and the HTTP surface without hitting real services
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use loan_lead_form::config::{Config, RateLimit, RedirectRule};
use loan_lead_form::geolocation::{GeolocationService, PredictedStateCache};
use loan_lead_form::handlers::{self, AppState};
use loan_lead_form::models::{LeadSubmission, SubmissionOrigin, SubmitLeadResponse};
use loan_lead_form::overlay::{Overlay, OverlayPhase};
use loan_lead_form::settings::{resolve_settings, SettingsQuery};
use loan_lead_form::submission::{SubmissionContext, SubmissionPipeline, SubmissionState};
use loan_lead_form::validation::LeadForm;
use loan_lead_form::webhooks::{
    DeliveryMode, DeliveryOutcome, LeadSink, WebhookClient, WebhookEndpoints, WebhookTarget,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request as MockRequest, ResponseTemplate};

/// Helper function to point both webhooks and geolocation at a mock server
fn create_test_config(base_url: &str) -> Config {
    Config {
        webhooks: WebhookEndpoints {
            primary: WebhookTarget {
                name: "Formcarry".to_string(),
                url: format!("{}/primary", base_url),
                mode: DeliveryMode::Cors,
            },
            secondary: WebhookTarget {
                name: "Cloudflare Worker".to_string(),
                url: format!("{}/secondary", base_url),
                mode: DeliveryMode::NoCors,
            },
        },
        geolocation_base_url: base_url.to_string(),
        ..Config::default()
    }
}

fn valid_form() -> LeadForm {
    LeadForm {
        fname: "Sam".to_string(),
        lname: "Lee".to_string(),
        email: "sam@example.com".to_string(),
        phone: "0412345678".to_string(),
        amount: "50000".to_string(),
    }
}

fn submission_for(brand: &str) -> LeadSubmission {
    let config = Config::default();
    let query = SettingsQuery {
        brand: Some(brand.to_string()),
        ..Default::default()
    };
    let settings = resolve_settings(&config.form_defaults, &query, &config.palette);
    LeadSubmission::new(valid_form().validate().unwrap(), &settings)
}

fn received_json(request: &MockRequest) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap()
}

#[tokio::test]
async fn test_cors_delivery_reads_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/primary"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 200})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let client = WebhookClient::new(None).unwrap();
    let payload = submission_for("Acme").payload();

    let outcome = client
        .deliver(&config.webhooks.primary, &payload)
        .await
        .unwrap();

    assert_eq!(outcome.status(), 200);
    match outcome {
        DeliveryOutcome::Responded { body, .. } => assert!(body.contains("200")),
        DeliveryOutcome::Opaque => panic!("cors delivery should be readable"),
    }
}

#[tokio::test]
async fn test_no_cors_delivery_is_opaque() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker exploded"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let client = WebhookClient::new(None).unwrap();
    let payload = submission_for("Acme").payload();

    let outcome = client
        .deliver(&config.webhooks.secondary, &payload)
        .await
        .unwrap();

    assert_eq!(outcome, DeliveryOutcome::Opaque);
    assert_eq!(outcome.status(), 0);
}

#[tokio::test]
async fn test_unreachable_webhook_is_an_error() {
    let target = WebhookTarget {
        name: "Formcarry".to_string(),
        url: "http://127.0.0.1:1/primary".to_string(),
        mode: DeliveryMode::Cors,
    };
    let client = WebhookClient::new(Some(Duration::from_secs(2))).unwrap();

    let result = client.deliver(&target, &submission_for("Acme").payload()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_pipeline_delivers_to_both_and_redirects() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/primary"))
        .and(body_partial_json(serde_json::json!({
            "fname": "Sam",
            "phone": "+61412345678",
            "amount": 50000,
            "lstatus": "New Lead",
            "iso": "AU",
            "brand": "loansone",
            "submission_url": "https://partner.example/apply",
            "predicted_state": "Victoria"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let sink: Arc<dyn LeadSink> = Arc::new(WebhookClient::new(None).unwrap());
    let mut pipeline = SubmissionPipeline::new(
        sink,
        config.webhooks.clone(),
        config.redirect.clone(),
        Overlay::new(config.overlay_message_delay),
    );

    let state = pipeline
        .submit(
            submission_for("loansone"),
            SubmissionContext {
                origin: SubmissionOrigin {
                    submission_url: "https://partner.example/apply".to_string(),
                    predicted_state: "Victoria".to_string(),
                },
                has_top_frame: true,
            },
        )
        .await
        .unwrap();

    assert!(matches!(state, SubmissionState::Redirecting { .. }));

    let requests = mock_server.received_requests().await.unwrap();
    let secondary = requests
        .iter()
        .find(|r| r.url.path() == "/secondary")
        .unwrap();
    let body = received_json(secondary);
    assert!(body.get("submission_url").is_none());
    assert!(body.get("predicted_state").is_none());
    assert_eq!(body["lead_source"], "Business Loan Form");
}

#[tokio::test]
async fn test_pipeline_settles_when_primary_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());

    let sink: Arc<dyn LeadSink> = Arc::new(WebhookClient::new(None).unwrap());
    let mut pipeline = SubmissionPipeline::new(
        sink,
        config.webhooks.clone(),
        RedirectRule {
            brand: "LoansOne".to_string(),
            url: "https://loansone.com.au/thank-you-unsecured2/".to_string(),
        },
        Overlay::new(config.overlay_message_delay),
    );

    let state = pipeline
        .submit(submission_for("Acme"), SubmissionContext::default())
        .await
        .unwrap();

    assert_eq!(
        state,
        &SubmissionState::SettledInPlace {
            first_name: "Sam".to_string()
        }
    );
}

#[tokio::test]
async fn test_geolocation_lookup_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/203.0.113.7/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ip": "203.0.113.7",
            "country_code": "AU",
            "region": "New South Wales",
            "city": "Sydney"
        })))
        .mount(&mock_server)
        .await;

    let service = GeolocationService::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let cache = PredictedStateCache::default();
    let ip = Some("203.0.113.7".parse().unwrap());

    assert_eq!(cache.predicted_state(ip).await, "");
    cache.warm(&service, ip).await;
    assert_eq!(cache.predicted_state(ip).await, "New South Wales");
}

#[tokio::test]
async fn test_geolocation_outside_australia_is_absent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "country_code": "NZ",
            "region": "Auckland"
        })))
        .mount(&mock_server)
        .await;

    let service = GeolocationService::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    assert_eq!(service.predict_state(None).await, None);
}

#[tokio::test]
async fn test_geolocation_failure_is_absent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let service = GeolocationService::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    assert!(service.lookup(None).await.is_err());
    assert_eq!(service.predict_state(None).await, None);
}

#[tokio::test]
async fn test_concurrent_page_loads_share_one_lookup() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/203.0.113.7/json/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(serde_json::json!({
                    "country_code": "AU",
                    "region": "Tasmania"
                })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = GeolocationService::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let cache = PredictedStateCache::default();
    let ip = Some("203.0.113.7".parse().unwrap());

    tokio::join!(
        cache.warm(&service, ip),
        cache.warm(&service, ip),
        cache.warm(&service, ip),
    );
    cache.warm(&service, ip).await;

    assert_eq!(cache.predicted_state(ip).await, "Tasmania");
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_geolocation_gives_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(serde_json::json!({"country_code": "AU", "region": "Victoria"})),
        )
        .mount(&mock_server)
        .await;

    let service =
        GeolocationService::new(mock_server.uri(), Duration::from_millis(200)).unwrap();
    let cache = PredictedStateCache::default();

    let started = Instant::now();
    cache.warm(&service, None).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(cache.predicted_state(None).await, "");
}

#[cfg(test)]
mod handler_tests {
    use super::*;

    async fn mount_webhooks(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ResponseTemplate::new(200))
            .mount(mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/secondary"))
            .respond_with(ResponseTemplate::new(200))
            .mount(mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "country_code": "AU",
                "region": "Queensland"
            })))
            .mount(mock_server)
            .await;
    }

    fn app_for(config: Config) -> axum::Router {
        handlers::app(Arc::new(AppState::new(config).unwrap()))
    }

    async fn post_json(
        app: axum::Router,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn page_request(peer: SocketAddr, forwarded_for: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("x-forwarded-for", forwarded_for)
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_form_page_is_rate_limited_per_peer() {
        let mock_server = MockServer::start().await;
        mount_webhooks(&mock_server).await;

        let state = Arc::new(AppState::new(create_test_config(&mock_server.uri())).unwrap());
        let app = handlers::rate_limited(
            handlers::page_routes(),
            RateLimit {
                per_second: 60,
                burst_size: 2,
            },
            false,
        )
        .unwrap()
        .with_state(state);

        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        for forwarded_for in ["203.0.113.1", "203.0.113.2"] {
            let response = app
                .clone()
                .oneshot(page_request(peer, forwarded_for))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        // A fresh forwarded address does not buy a fresh quota
        let response = app
            .oneshot(page_request(peer, "203.0.113.3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_for(Config::default());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_page_uses_query_settings() {
        let mock_server = MockServer::start().await;
        mount_webhooks(&mock_server).await;

        let app = app_for(create_test_config(&mock_server.uri()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?color=green&buttonText=Get+Started")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("#008000"));
        assert!(html.contains("Get Started"));
        assert!(html.contains("By clicking the Get Started button"));
    }

    #[tokio::test]
    async fn test_submit_redirects_for_redirect_brand() {
        let mock_server = MockServer::start().await;
        mount_webhooks(&mock_server).await;

        let app = app_for(create_test_config(&mock_server.uri()));
        let mut body = serde_json::to_value(valid_form()).unwrap();
        body["has_top_frame"] = serde_json::json!(false);

        let (status, json) = post_json(app, "/api/v1/leads?brand=LoansOne", body).await;

        assert_eq!(status, StatusCode::OK);
        let response: SubmitLeadResponse = serde_json::from_value(json).unwrap();
        match response {
            SubmitLeadResponse::Redirecting {
                first_name,
                redirect_url,
                target,
                overlay,
            } => {
                assert_eq!(first_name, "Sam");
                assert_eq!(redirect_url, "https://loansone.com.au/thank-you-unsecured2/");
                assert_eq!(target, loan_lead_form::models::RedirectTarget::Current);
                assert_eq!(overlay.phase, OverlayPhase::Spinner);
                assert!(overlay.message_in_ms.is_some());
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_settles_for_other_brands() {
        let mock_server = MockServer::start().await;
        mount_webhooks(&mock_server).await;

        let app = app_for(create_test_config(&mock_server.uri()));
        let body = serde_json::to_value(valid_form()).unwrap();

        let (status, json) = post_json(app, "/api/v1/leads", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "settled");
        assert_eq!(json["first_name"], "Sam");
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_submission_sends_nothing() {
        let mock_server = MockServer::start().await;
        mount_webhooks(&mock_server).await;

        let app = app_for(create_test_config(&mock_server.uri()));
        let mut body = serde_json::to_value(valid_form()).unwrap();
        body["email"] = serde_json::json!("not-an-email");
        body["phone"] = serde_json::json!("0212345678");

        let (status, json) = post_json(app, "/api/v1/leads", body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["fields"]["email"], "Please enter a valid email address");
        assert_eq!(json["fields"]["phone"], "Must be an Australian Mobile");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_field_check() {
        let app = app_for(Config::default());
        let (status, json) = post_json(
            app,
            "/api/v1/leads/validate",
            serde_json::json!({"field": "fname", "value": "A"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"], false);
        assert_eq!(json["message"], "First name must be at least 2 characters");
    }

    #[tokio::test]
    async fn test_verification_routes_hidden_by_default() {
        let app = app_for(Config::default());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/verification/request")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"phone":"0412345678"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_verification_when_enabled() {
        let config = Config {
            verification_enabled: true,
            ..Config::default()
        };

        let (status, _) = post_json(
            app_for(config.clone()),
            "/api/v1/verification/request",
            serde_json::json!({"phone": "0412345678"}),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, json) = post_json(
            app_for(config.clone()),
            "/api/v1/verification/verify",
            serde_json::json!({"phone": "0412345678", "code": "12ab3456"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["verified"], true);

        let (status, _) = post_json(
            app_for(config),
            "/api/v1/verification/verify",
            serde_json::json!({"phone": "0412345678", "code": "123"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
