// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encrypted on-disk token file.
//!
//! The file is a JSON object:
//!
//! ```json
//! {
//!   "access.key.id": "<base64>",
//!   "access.key.secret": "<base64>",
//!   "security.token": "<base64>",
//!   "expiration": "2024-05-01T12:00:00Z",
//!   "keyring": "<raw AES key>"
//! }
//! ```
//!
//! Each encrypted field decodes to a 16-byte IV followed by AES-CBC ciphertext
//! with PKCS#7 padding. The keyring length selects AES-128, AES-192 or AES-256.

use aes::cipher::{block_padding::Pkcs7, BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use envctl_common_core::Clock;
use envctl_common_secret::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{CredentialError, CredentialResult};
use crate::provider::CredentialProvider;
use crate::Credential;

const IV_LEN: usize = 16;

#[derive(Deserialize)]
struct TokenFile {
	#[serde(rename = "access.key.id")]
	access_key_id: String,
	#[serde(rename = "access.key.secret")]
	access_key_secret: String,
	#[serde(rename = "security.token")]
	security_token: String,
	expiration: String,
	keyring: SecretString,
}

pub struct TokenFileProvider {
	path: PathBuf,
	clock: Arc<dyn Clock>,
}

impl TokenFileProvider {
	pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
		Self {
			path: path.into(),
			clock,
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl CredentialProvider for TokenFileProvider {
	fn name(&self) -> &'static str {
		"token-file"
	}

	#[instrument(skip(self), fields(path = %self.path.display()))]
	async fn fetch(&self) -> CredentialResult<Credential> {
		let content = match tokio::fs::read(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(CredentialError::FileMissing {
					path: self.path.clone(),
				});
			}
			Err(e) => {
				return Err(CredentialError::Io {
					path: self.path.clone(),
					source: e,
				});
			}
		};

		let credential = parse_token_file(&content)?;
		if let Some(expiration) = credential.expiration {
			if credential.is_stale(self.clock.now()) {
				return Err(CredentialError::Expired { expiration });
			}
		}

		debug!(expiration = ?credential.expiration, "loaded credential from token file");
		Ok(credential)
	}
}

fn parse_token_file(content: &[u8]) -> CredentialResult<Credential> {
	let file: TokenFile = serde_json::from_slice(content)
		.map_err(|e| CredentialError::Malformed(format!("token file is not valid JSON: {e}")))?;

	let key = file.keyring.expose().as_bytes();
	let access_key_id = decrypt_field("access.key.id", &file.access_key_id, key)?;
	let access_key_secret = decrypt_field("access.key.secret", &file.access_key_secret, key)?;
	let security_token = decrypt_field("security.token", &file.security_token, key)?;
	let expiration = parse_expiration(&file.expiration)?;

	Ok(Credential {
		access_key_id: access_key_id.expose().clone(),
		access_key_secret,
		security_token: Some(security_token).filter(|t| !t.is_empty()),
		expiration: Some(expiration),
	})
}

fn parse_expiration(raw: &str) -> CredentialResult<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw.trim())
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| CredentialError::Malformed(format!("invalid expiration '{raw}': {e}")))
}

fn decrypt_field(name: &str, encoded: &str, key: &[u8]) -> CredentialResult<SecretString> {
	let raw = STANDARD
		.decode(encoded.trim())
		.map_err(|e| CredentialError::Malformed(format!("{name}: invalid base64: {e}")))?;
	if raw.len() <= IV_LEN {
		return Err(CredentialError::Malformed(format!(
			"{name}: ciphertext shorter than IV"
		)));
	}
	let (iv, ciphertext) = raw.split_at(IV_LEN);

	let plaintext = match key.len() {
		16 => decrypt::<aes::Aes128>(key, iv, ciphertext),
		24 => decrypt::<aes::Aes192>(key, iv, ciphertext),
		32 => decrypt::<aes::Aes256>(key, iv, ciphertext),
		n => {
			return Err(CredentialError::Malformed(format!(
				"keyring length {n} is not a valid AES key size"
			)))
		}
	}
	.ok_or_else(|| CredentialError::Malformed(format!("{name}: decryption failed")))?;

	String::from_utf8(plaintext)
		.map(SecretString::new)
		.map_err(|_| CredentialError::Malformed(format!("{name}: plaintext is not UTF-8")))
}

fn decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>>
where
	C: BlockCipher + BlockDecryptMut + KeyInit,
{
	cbc::Decryptor::<C>::new_from_slices(key, iv)
		.ok()?
		.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
		.ok()
}
