//! End-to-end routing through the handler with a mocked parameter store and a manual clock.

// std
use std::sync::Arc;
// crates.io
use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::json;
use stable_presign::{
	Config, Credentials, Handler, ParameterStore, Request, S3Presigner, SecretParameterProducer,
	SingleFlight, Strategies, sign::ManualClock, strategy::CREDENTIAL_CACHE,
};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_partial_json, method},
};

const PARAMETER: &str = "/presign/secret-access-key";

struct Harness {
	handler: Handler,
	clock: Arc<ManualClock>,
}
impl Harness {
	fn new(server: &MockServer, secret_parameter: Option<&str>) -> Self {
		let config = Config {
			bucket: Some("images-bucket".into()),
			secret_parameter: secret_parameter.map(str::to_owned),
			access_key_id: Some("AKIAPINNED".into()),
			region: Some("eu-west-1".into()),
			ssm_endpoint: Some(Url::parse(&server.uri()).expect("mock server uri")),
			..Config::default()
		}
		.with_require_https(false);
		let ambient = Credentials::new("ASIAROLE", "role-secret").with_session_token("session");
		let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 0).unwrap()));
		let store = ParameterStore::with_client(
			&config,
			Some(ambient.clone()),
			clock.clone(),
			reqwest::Client::new(),
		);
		let producer = SecretParameterProducer::new(Arc::new(store), config.secret_parameter.clone());
		let cache = Arc::new(SingleFlight::new(CREDENTIAL_CACHE, config.credential_ttl, producer));
		let signer = Arc::new(S3Presigner::new(&config, Some(ambient), clock.clone()));
		let strategies = Strategies::new(config, signer, cache, clock.clone()).expect("strategies");

		Self { handler: Handler::new(strategies), clock }
	}

	async fn body(&self, path: &str) -> String {
		let response = self.handler.handle(&Request::new(path)).await;

		assert_eq!(response.status_code, 200, "{path} failed");

		response.body
	}
}

async fn mock_parameter(server: &MockServer, expected_calls: u64) {
	Mock::given(method("POST"))
		.and(body_partial_json(json!({ "Name": PARAMETER, "WithDecryption": true })))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(json!({ "Parameter": { "Name": PARAMETER, "Value": "pinned-secret" } })),
		)
		.expect(expected_calls)
		.mount(server)
		.await;
}

#[tokio::test]
async fn stable_urls_are_identical_within_a_bucket() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mock_parameter(&server, 1).await;

	let harness = Harness::new(&server, Some(PARAMETER));
	let first = harness.body("/stable/0").await;

	assert_eq!(harness.body("stable/1").await, first);

	harness.clock.advance(TimeDelta::minutes(3));

	assert_eq!(harness.body("/stable/2").await, first);

	harness.clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap());

	let next = harness.body("/stable/3").await;

	assert_ne!(next, first);
	assert!(first.starts_with("https://images-bucket.s3.eu-west-1.amazonaws.com/test.jpg?"));
	assert!(first.contains("X-Amz-Credential=AKIAPINNED%2F20240301%2Feu-west-1%2Fs3%2Faws4_request"));
	assert!(first.contains("X-Amz-Date=20240301T120000Z"));
	assert!(!first.contains("X-Amz-Security-Token"));
	assert!(next.contains("X-Amz-Date=20240301T120500Z"));

	server.verify().await;
}

#[tokio::test]
async fn fixed_time_is_stable_while_base_follows_the_clock() {
	let server = MockServer::start().await;

	mock_parameter(&server, 0).await;

	let harness = Harness::new(&server, Some(PARAMETER));
	let fixed = harness.body("/fixed_time/0").await;
	let base = harness.body("/base/0").await;

	harness.clock.advance(TimeDelta::seconds(1));

	assert_eq!(harness.body("/fixed_time/1").await, fixed);
	assert_ne!(harness.body("/base/1").await, base);
	assert!(fixed.contains("X-Amz-Credential=ASIAROLE%2F"));
	assert!(fixed.contains("X-Amz-Security-Token=session"));
	assert!(base.contains("X-Amz-Date=20240301T120100Z"));

	server.verify().await;
}

#[tokio::test]
async fn unmatched_paths_render_the_index() {
	let server = MockServer::start().await;
	let harness = Harness::new(&server, Some(PARAMETER));

	for path in ["/", "/favicon.ico", "base"] {
		let response = harness.handler.handle(&Request::new(path)).await;

		assert_eq!(response.status_code, 200);
		assert_eq!(response.headers.get("content-type").map(String::as_str), Some("text/html"));
		assert!(response.body.contains("src=\"/stable/4\""));
	}
}

#[tokio::test]
async fn missing_parameter_name_fails_only_the_stable_route() {
	let server = MockServer::start().await;

	mock_parameter(&server, 0).await;

	let harness = Harness::new(&server, None);
	let stable = harness.handler.handle(&Request::new("/stable/0")).await;

	assert_eq!(stable.status_code, 500);
	assert!(!stable.body.contains("SECRET_ACCESS_KEY_PARAMETER"));
	assert_eq!(harness.handler.handle(&Request::new("/base/0")).await.status_code, 200);

	server.verify().await;
}

#[tokio::test]
async fn parameter_store_failure_is_retried_on_the_next_request() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(400).set_body_json(json!({ "__type": "AccessDeniedException" })))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	mock_parameter(&server, 1).await;

	let harness = Harness::new(&server, Some(PARAMETER));

	let cache = harness.handler.strategies().credential_cache();

	assert_eq!(harness.handler.handle(&Request::new("/stable/0")).await.status_code, 500);
	assert_eq!(cache.snapshot().await.consecutive_failures, 1);
	assert!(harness.body("/stable/0").await.contains("X-Amz-Credential=AKIAPINNED%2F"));

	let snapshot = cache.snapshot().await;

	assert_eq!(snapshot.attempts, 2);
	assert_eq!(snapshot.consecutive_failures, 0);

	server.verify().await;
}
