// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request signing.
//!
//! Two schemes are in use: the Log Service data-plane signature (`LOG
//! ak:signature` in the `Authorization` header) and the RPC-style signature
//! carried as a `Signature` query parameter for the product API.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use url::form_urlencoded;

use envctl_credentials::Credential;

type HmacSha1 = Hmac<Sha1>;

pub const API_VERSION: &str = "0.6.0";
pub const SIGNATURE_METHOD: &str = "hmac-sha1";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Everything the data-plane signature covers.
#[derive(Debug)]
pub struct LogRequest<'a> {
	pub method: &'a str,
	/// Path, e.g. `/logstores/catalina`.
	pub resource: &'a str,
	pub query: &'a [(String, String)],
	pub body: &'a [u8],
	pub date: DateTime<Utc>,
}

/// HTTP date in the RFC 1123 form the service expects.
pub fn http_date(at: DateTime<Utc>) -> String {
	at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn hmac_sha1_base64(key: &[u8], data: &[u8]) -> String {
	let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
	mac.update(data);
	BASE64.encode(mac.finalize().into_bytes())
}

fn content_md5(body: &[u8]) -> String {
	hex::encode_upper(Md5::digest(body))
}

/// Sign a data-plane request and return every header it must carry.
pub fn sign_log_request(credential: &Credential, request: &LogRequest<'_>) -> Vec<(String, String)> {
	let date = http_date(request.date);
	let (md5, content_type) = if request.body.is_empty() {
		(String::new(), String::new())
	} else {
		(content_md5(request.body), CONTENT_TYPE_JSON.to_string())
	};

	let mut log_headers: Vec<(String, String)> = vec![
		("x-log-apiversion".to_string(), API_VERSION.to_string()),
		("x-log-signaturemethod".to_string(), SIGNATURE_METHOD.to_string()),
		("x-log-bodyrawsize".to_string(), request.body.len().to_string()),
	];
	if let Some(token) = credential.security_token.as_ref().filter(|t| !t.is_empty()) {
		log_headers.push(("x-acs-security-token".to_string(), token.expose().clone()));
	}
	log_headers.sort();

	let string_to_sign = string_to_sign(
		request.method,
		&md5,
		&content_type,
		&date,
		&log_headers,
		&canonical_resource(request.resource, request.query),
	);
	let signature = hmac_sha1_base64(
		credential.access_key_secret.expose().as_bytes(),
		string_to_sign.as_bytes(),
	);

	let mut headers = log_headers;
	headers.push(("date".to_string(), date));
	if !md5.is_empty() {
		headers.push(("content-md5".to_string(), md5));
		headers.push(("content-type".to_string(), content_type));
	}
	headers.push((
		"authorization".to_string(),
		format!("LOG {}:{}", credential.access_key_id, signature),
	));
	headers
}

fn string_to_sign(
	method: &str,
	md5: &str,
	content_type: &str,
	date: &str,
	sorted_headers: &[(String, String)],
	resource: &str,
) -> String {
	let canonical_headers = sorted_headers
		.iter()
		.map(|(k, v)| format!("{k}:{v}"))
		.collect::<Vec<_>>()
		.join("\n");
	format!("{method}\n{md5}\n{content_type}\n{date}\n{canonical_headers}\n{resource}")
}

fn canonical_resource(resource: &str, query: &[(String, String)]) -> String {
	if query.is_empty() {
		return resource.to_string();
	}
	let mut sorted: Vec<_> = query.iter().collect();
	sorted.sort();
	let joined = sorted
		.iter()
		.map(|(k, v)| format!("{k}={v}"))
		.collect::<Vec<_>>()
		.join("&");
	format!("{resource}?{joined}")
}

/// RPC percent-encoding: RFC 3986 unreserved characters pass through.
pub fn percent_encode(value: &str) -> String {
	form_urlencoded::byte_serialize(value.as_bytes())
		.collect::<String>()
		.replace('+', "%20")
		.replace('*', "%2A")
		.replace("%7E", "~")
}

/// Canonical query string for an RPC request, keys sorted.
pub fn canonical_query(params: &[(String, String)]) -> String {
	let mut sorted: Vec<_> = params.iter().collect();
	sorted.sort();
	sorted
		.iter()
		.map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
		.collect::<Vec<_>>()
		.join("&")
}

/// Signature for an RPC `GET /` request over `params`.
pub fn sign_rpc(access_key_secret: &str, params: &[(String, String)]) -> String {
	let string_to_sign = format!("GET&%2F&{}", percent_encode(&canonical_query(params)));
	hmac_sha1_base64(
		format!("{access_key_secret}&").as_bytes(),
		string_to_sign.as_bytes(),
	)
}
