//! AWS Signature Version 4.
//!
//! Two flavours are provided: [query string authentication] for pre-signed URLs, and header
//! authorization for JSON API calls such as SSM.
//!
//! [query string authentication]: https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-query-string-auth.html

// crates.io
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;
// self
use crate::{_prelude::*, credentials::Credentials};

/// Signing algorithm identifier.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
/// Payload hash used for pre-signed URLs.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Time, region, and service a signature is bound to.
#[derive(Clone, Debug)]
pub struct Scope<'a> {
	time: DateTime<Utc>,
	region: &'a str,
	service: &'a str,
}
impl<'a> Scope<'a> {
	/// Bind a signature to `time`, `region`, and `service`.
	pub fn new(time: DateTime<Utc>, region: &'a str, service: &'a str) -> Self {
		Self { time, region, service }
	}

	/// `YYYYMMDDTHHMMSSZ` timestamp.
	pub fn amz_date(&self) -> String {
		self.time.format("%Y%m%dT%H%M%SZ").to_string()
	}

	/// `date/region/service/aws4_request`.
	pub fn credential_scope(&self) -> String {
		format!("{}/{}/{}/aws4_request", self.time.format("%Y%m%d"), self.region, self.service)
	}
}

/// Key derived through `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`.
struct SigningKey(Vec<u8>);
impl SigningKey {
	fn derive(secret: &str, scope: &Scope<'_>) -> Result<Self> {
		let date = scope.time.format("%Y%m%d").to_string();
		let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
		let k_region = hmac(&k_date, scope.region.as_bytes())?;
		let k_service = hmac(&k_region, scope.service.as_bytes())?;

		Ok(Self(hmac(&k_service, b"aws4_request")?))
	}

	fn sign(&self, string_to_sign: &str) -> Result<String> {
		Ok(hex_encode(&hmac(&self.0, string_to_sign.as_bytes())?))
	}
}

/// Pre-sign a GET of `path` (unencoded, starting with `/`) on `base`.
pub fn presign_url(
	base: &Url,
	path: &str,
	credentials: &Credentials,
	scope: &Scope<'_>,
	expires_in: Duration,
) -> Result<Url> {
	let host = host_header(base)?;
	let canonical_uri = percent_encode_path(path);
	let mut params = vec![
		("X-Amz-Algorithm", ALGORITHM.to_owned()),
		(
			"X-Amz-Credential",
			format!("{}/{}", credentials.access_key_id(), scope.credential_scope()),
		),
		("X-Amz-Date", scope.amz_date()),
		("X-Amz-Expires", expires_in.as_secs().to_string()),
		("X-Amz-SignedHeaders", "host".to_owned()),
	];

	if let Some(token) = credentials.session_token() {
		params.push(("X-Amz-Security-Token", token.expose().to_owned()));
	}

	params.sort_by(|a, b| a.0.cmp(b.0));

	let canonical_query = params
		.iter()
		.map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
		.collect::<Vec<_>>()
		.join("&");
	let canonical_request = format!(
		"GET\n{canonical_uri}\n{canonical_query}\nhost:{host}\n\nhost\n{UNSIGNED_PAYLOAD}"
	);
	let signature = SigningKey::derive(credentials.secret_access_key().expose(), scope)?
		.sign(&string_to_sign(scope, &canonical_request))?;
	let mut url = base.clone();

	url.set_path(&canonical_uri);
	url.set_query(Some(&format!("{canonical_query}&X-Amz-Signature={signature}")));

	Ok(url)
}

/// Compute the headers that authorize a request: `x-amz-date`, `x-amz-security-token` when the
/// credentials carry one, and `authorization`.
///
/// `headers` lists the additional headers the request will be sent with; `host` is derived from
/// `url` and always signed.
pub fn authorization_headers(
	method: &str,
	url: &Url,
	headers: &[(&str, &str)],
	payload: &[u8],
	credentials: &Credentials,
	scope: &Scope<'_>,
) -> Result<Vec<(String, String)>> {
	let amz_date = scope.amz_date();
	let mut signed = vec![
		("host".to_owned(), host_header(url)?),
		("x-amz-date".to_owned(), amz_date.clone()),
	];

	signed.extend(headers.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_owned())));

	if let Some(token) = credentials.session_token() {
		signed.push(("x-amz-security-token".to_owned(), token.expose().to_owned()));
	}

	signed.sort_by(|a, b| a.0.cmp(&b.0));

	let signed_headers = signed.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(";");
	let canonical_headers = signed.iter().map(|(k, v)| format!("{k}:{v}\n")).collect::<String>();
	let mut query = url.query_pairs().collect::<Vec<_>>();

	query.sort();

	let canonical_query = query
		.iter()
		.map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
		.collect::<Vec<_>>()
		.join("&");
	let canonical_uri = if url.path().is_empty() { "/" } else { url.path() };
	let canonical_request = format!(
		"{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{}",
		hex_encode(&Sha256::digest(payload))
	);
	let signature = SigningKey::derive(credentials.secret_access_key().expose(), scope)?
		.sign(&string_to_sign(scope, &canonical_request))?;
	let authorization = format!(
		"{ALGORITHM} Credential={}/{}, SignedHeaders={signed_headers}, Signature={signature}",
		credentials.access_key_id(),
		scope.credential_scope(),
	);
	let mut out = vec![("x-amz-date".to_owned(), amz_date)];

	if let Some(token) = credentials.session_token() {
		out.push(("x-amz-security-token".to_owned(), token.expose().to_owned()));
	}

	out.push(("authorization".to_owned(), authorization));

	Ok(out)
}

/// Host header value for `url`, including the port when it is not the scheme default.
pub fn host_header(url: &Url) -> Result<String> {
	let host = url
		.host_str()
		.ok_or_else(|| Error::Signing(format!("Endpoint {url} must include a host.")))?;

	Ok(match url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_owned(),
	})
}

/// Percent-encode per RFC 3986, leaving only unreserved characters as-is.
pub fn percent_encode(value: &str) -> String {
	let mut encoded = String::with_capacity(value.len() * 3);

	for byte in value.bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' =>
				encoded.push(byte as char),
			_ => encoded.push_str(&format!("%{byte:02X}")),
		}
	}

	encoded
}

/// Like [`percent_encode`] but keeps `/` so object key hierarchies survive.
pub fn percent_encode_path(path: &str) -> String {
	percent_encode(path).replace("%2F", "/")
}

fn string_to_sign(scope: &Scope<'_>, canonical_request: &str) -> String {
	format!(
		"{ALGORITHM}\n{}\n{}\n{}",
		scope.amz_date(),
		scope.credential_scope(),
		hex_encode(&Sha256::digest(canonical_request.as_bytes()))
	)
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
	let mut mac =
		Hmac::<Sha256>::new_from_slice(key).map_err(|err| Error::Signing(err.to_string()))?;

	mac.update(data);

	Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_encode(bytes: &[u8]) -> String {
	bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
