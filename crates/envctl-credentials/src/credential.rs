// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use envctl_common_secret::SecretString;

/// An access key pair with an optional STS session token.
///
/// Replaced wholesale on refresh, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
	pub access_key_id: String,
	pub access_key_secret: SecretString,
	pub security_token: Option<SecretString>,
	pub expiration: Option<DateTime<Utc>>,
}

impl Credential {
	/// A long-lived key pair without session token or expiration.
	pub fn fixed(access_key_id: impl Into<String>, access_key_secret: SecretString) -> Self {
		Self {
			access_key_id: access_key_id.into(),
			access_key_secret,
			security_token: None,
			expiration: None,
		}
	}

	/// True once `now` has reached the expiration instant.
	pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
		self.expiration.is_some_and(|expiration| now >= expiration)
	}

	/// Time left before expiration, `None` when the credential never expires.
	pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
		self.expiration.map(|expiration| expiration - now)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn fixed_credentials_never_go_stale() {
		let credential = Credential::fixed("LTAIexample", SecretString::from("secret"));
		let far_future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
		assert!(!credential.is_stale(far_future));
		assert!(credential.remaining(far_future).is_none());
	}

	#[test]
	fn stale_at_and_after_expiration() {
		let expiration = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
		let credential = Credential {
			expiration: Some(expiration),
			..Credential::fixed("id", SecretString::from("secret"))
		};

		assert!(!credential.is_stale(expiration - chrono::Duration::seconds(1)));
		assert!(credential.is_stale(expiration));
		assert!(credential.is_stale(expiration + chrono::Duration::seconds(1)));
	}

	#[test]
	fn debug_does_not_leak_secret_or_token() {
		let credential = Credential {
			security_token: Some(SecretString::from("sts-token-value")),
			..Credential::fixed("LTAIexample", SecretString::from("secret-value"))
		};
		let debug = format!("{credential:?}");
		assert!(!debug.contains("secret-value"));
		assert!(!debug.contains("sts-token-value"));
		assert!(debug.contains("LTAIexample"));
	}
}
