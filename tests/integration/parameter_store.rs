//! Parameter store client against a mocked SSM endpoint.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use chrono::{TimeZone, Utc};
use serde_json::json;
use stable_presign::{
	Config, Credentials, Error, JitterStrategy, ParameterStore, Result, RetryPolicy,
	sign::ManualClock,
};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_json, header, header_exists, method, path},
};

const PARAMETER: &str = "/presign/secret-access-key";

fn store(server: &MockServer) -> ParameterStore {
	let config = Config {
		region: Some("eu-west-1".into()),
		ssm_endpoint: Some(Url::parse(&server.uri()).expect("mock server uri")),
		retry_policy: RetryPolicy { jitter: JitterStrategy::None, ..RetryPolicy::default() },
		..Config::default()
	}
	.with_require_https(false);
	let credentials = Credentials::new("ASIAROLE", "role-secret").with_session_token("session");
	let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));

	ParameterStore::with_client(&config, Some(credentials), clock, reqwest::Client::new())
}

fn parameter_body(value: &str) -> serde_json::Value {
	json!({ "Parameter": { "Name": PARAMETER, "Type": "SecureString", "Value": value, "Version": 3 } })
}

#[tokio::test]
async fn fetches_decrypted_parameter_with_signed_request() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/"))
		.and(header("x-amz-target", "AmazonSSM.GetParameter"))
		.and(header("content-type", "application/x-amz-json-1.1"))
		.and(header("x-amz-date", "20240301T120000Z"))
		.and(header("x-amz-security-token", "session"))
		.and(header_exists("authorization"))
		.and(body_json(json!({ "Name": PARAMETER, "WithDecryption": true })))
		.respond_with(ResponseTemplate::new(200).set_body_json(parameter_body("pinned-secret")))
		.expect(1)
		.mount(&server)
		.await;

	let secret = store(&server).get_parameter(PARAMETER, true).await?;

	assert_eq!(secret.expose(), "pinned-secret");

	let requests = server.received_requests().await.unwrap_or_default();
	let authorization = requests[0].headers.get("authorization").unwrap().to_str().unwrap();

	assert!(authorization.starts_with(
		"AWS4-HMAC-SHA256 Credential=ASIAROLE/20240301/eu-west-1/ssm/aws4_request, SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target, Signature="
	));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn missing_parameter_is_not_retried() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(
			ResponseTemplate::new(400)
				.set_body_json(json!({ "__type": "ParameterNotFound", "message": "" })),
		)
		.expect(1)
		.mount(&server)
		.await;

	let err = store(&server).get_parameter(PARAMETER, true).await.unwrap_err();

	assert!(matches!(
		err,
		Error::HttpStatus { status, body: Some(ref body), .. }
			if status == 400 && body.contains("ParameterNotFound")
	));

	server.verify().await;
}

#[tokio::test]
async fn transient_failures_are_retried() -> Result<()> {
	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let handle = counter.clone();

	Mock::given(method("POST"))
		.respond_with(move |_: &wiremock::Request| match handle.fetch_add(1, Ordering::SeqCst) {
			0 => ResponseTemplate::new(500),
			1 => ResponseTemplate::new(400)
				.set_body_json(json!({ "__type": "ThrottlingException", "message": "Rate exceeded" })),
			_ => ResponseTemplate::new(200).set_body_json(parameter_body("eventually")),
		})
		.mount(&server)
		.await;

	let secret = store(&server).get_parameter(PARAMETER, true).await?;

	assert_eq!(secret.expose(), "eventually");
	assert_eq!(counter.load(Ordering::SeqCst), 3);

	Ok(())
}

#[tokio::test]
async fn parameter_without_value_is_reported() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Parameter": { "Name": PARAMETER } })))
		.mount(&server)
		.await;

	let err = store(&server).get_parameter(PARAMETER, true).await.unwrap_err();

	assert!(matches!(err, Error::MissingParameter { ref name } if name == PARAMETER));
}
