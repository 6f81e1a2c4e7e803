//! HMAC-SHA256 delivery signatures with a freshness window.
//!
//! Verification is total: every problem (unparsable header, stale timestamp, undecodable
//! secret, digest mismatch) becomes `false`. [`verify_detailed`] exposes the reason for logs.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
// self
use crate::{
	_prelude::*,
	webhook::{DEFAULT_TOLERANCE, SECRET_PREFIX},
};

type HmacSha256 = Hmac<Sha256>;

/// Shared signing secret, optionally carrying the `whsec_` prefix.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookSecret(String);
impl WebhookSecret {
	/// Wraps the secret exactly as issued by the provider.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw HMAC key: the prefix is stripped when present, the rest is base64-decoded.
	pub fn key_bytes(&self) -> Result<Vec<u8>, SecretError> {
		let encoded = self.0.trim();
		let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);

		if encoded.is_empty() {
			return Err(SecretError::Empty);
		}

		let key = STANDARD.decode(encoded).map_err(|source| SecretError::InvalidBase64 { source })?;

		if key.is_empty() { Err(SecretError::Empty) } else { Ok(key) }
	}
}
impl Debug for WebhookSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("WebhookSecret").field(&"<redacted>").finish()
	}
}

/// Reasons a [`WebhookSecret`] cannot produce key bytes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SecretError {
	/// Nothing left after stripping the prefix.
	#[error("Webhook secret is empty.")]
	Empty,
	/// Remainder is not standard base64.
	#[error("Webhook secret is not valid base64.")]
	InvalidBase64 {
		/// Decoder failure.
		#[source]
		source: base64::DecodeError,
	},
}

/// Parsed `t=..,v1=..` header.
///
/// Segments without `=` and unknown keys are skipped. A repeated `t` keeps the last value;
/// every `v1` is kept as a candidate digest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureHeader {
	/// `t` exactly as received.
	pub timestamp: Option<String>,
	/// All `v1` digests, in header order.
	pub signatures: Vec<String>,
}
impl SignatureHeader {
	/// Parses a raw header value.
	pub fn parse(raw: &str) -> Self {
		raw.split(',')
			.filter_map(|segment| segment.split_once('='))
			.map(|(key, value)| (key.trim(), value.trim()))
			.fold(Self::default(), |mut header, (key, value)| {
				match key {
					"t" => header.timestamp = Some(value.to_owned()),
					"v1" => header.signatures.push(value.to_owned()),
					_ => {},
				}

				header
			})
	}
}

/// Why a delivery failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum SignatureFailure {
	/// No `t` entry.
	#[error("signature header has no timestamp")]
	MissingTimestamp,
	/// No `v1` entry.
	#[error("signature header has no v1 digest")]
	MissingDigest,
	/// `t` is not an integer.
	#[error("signature timestamp is not a unix time")]
	InvalidTimestamp,
	/// `t` is further from the local clock than the tolerance allows.
	#[error("signature timestamp is outside the tolerance window")]
	Stale,
	/// The configured secret cannot be decoded.
	#[error("webhook secret is unusable")]
	InvalidSecret,
	/// No `v1` digest matches.
	#[error("no v1 digest matches the payload")]
	Mismatch,
}

/// Verifies a delivery against `secret` at `now` with the default five minute window.
pub fn verify(payload: &[u8], header: &str, secret: &WebhookSecret, now: OffsetDateTime) -> bool {
	verify_detailed(payload, header, secret, now, DEFAULT_TOLERANCE).is_ok()
}

/// Same as [`verify`] with a caller-chosen tolerance.
pub fn verify_with_tolerance(
	payload: &[u8],
	header: &str,
	secret: &WebhookSecret,
	now: OffsetDateTime,
	tolerance: Duration,
) -> bool {
	verify_detailed(payload, header, secret, now, tolerance).is_ok()
}

/// Verifies a delivery and reports the first failed check.
pub fn verify_detailed(
	payload: &[u8],
	header: &str,
	secret: &WebhookSecret,
	now: OffsetDateTime,
	tolerance: Duration,
) -> Result<(), SignatureFailure> {
	let header = SignatureHeader::parse(header);
	let raw_timestamp = header.timestamp.as_deref().ok_or(SignatureFailure::MissingTimestamp)?;

	if header.signatures.is_empty() {
		return Err(SignatureFailure::MissingDigest);
	}

	let timestamp =
		raw_timestamp.parse::<i64>().map_err(|_| SignatureFailure::InvalidTimestamp)?;

	if now.unix_timestamp().abs_diff(timestamp) > tolerance.whole_seconds().unsigned_abs() {
		return Err(SignatureFailure::Stale);
	}

	let key = secret.key_bytes().map_err(|_| SignatureFailure::InvalidSecret)?;
	let expected = digest(&key, raw_timestamp, payload).ok_or(SignatureFailure::InvalidSecret)?;
	// Every candidate is compared; no early exit on the first match.
	let matched = header
		.signatures
		.iter()
		.fold(Choice::from(0), |acc, candidate| {
			acc | constant_time_eq(expected.as_bytes(), candidate.as_bytes())
		});

	if bool::from(matched) { Ok(()) } else { Err(SignatureFailure::Mismatch) }
}

/// Produces a `t=..,v1=..` header for `payload`.
pub fn sign(payload: &[u8], secret: &WebhookSecret, timestamp: i64) -> Result<String, SecretError> {
	let key = secret.key_bytes()?;
	let timestamp = timestamp.to_string();
	let digest = digest(&key, &timestamp, payload).ok_or(SecretError::Empty)?;

	Ok(format!("t={timestamp},v1={digest}"))
}

fn digest(key: &[u8], timestamp: &str, payload: &[u8]) -> Option<String> {
	let mut mac = HmacSha256::new_from_slice(key).ok()?;

	mac.update(timestamp.as_bytes());
	mac.update(b".");
	mac.update(payload);

	Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(expected: &[u8], received: &[u8]) -> Choice {
	let same_len = (expected.len() as u64).ct_eq(&(received.len() as u64));

	same_len & fold_pairs(expected.iter().zip(received))
}

fn fold_pairs<'a>(pairs: impl Iterator<Item = (&'a u8, &'a u8)>) -> Choice {
	pairs.fold(Choice::from(1), |acc, (a, b)| acc & a.ct_eq(b))
}
