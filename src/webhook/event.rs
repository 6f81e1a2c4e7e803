//! Typed view of verified event payloads.
//!
//! Envelope: `{ "type": string, "data": { "id", "username"?, "primary_email_address_id",
//! "email_addresses": [{ "id", "email_address" }] } }`. Empty strings count as absent.

// self
use crate::_prelude::*;

/// User attributes carried by create/update events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Identity provider's user id.
	pub id: String,
	/// Primary email resolved through `primary_email_address_id`.
	pub email: String,
	/// Optional username.
	pub username: Option<String>,
}

/// Recognized event, or a forward-compatible placeholder for types this crate does not act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
	/// `user.created`
	UserCreated(UserProfile),
	/// `user.updated`
	UserUpdated(UserProfile),
	/// `user.deleted`
	UserDeleted {
		/// Deleted user's id.
		id: String,
	},
	/// Any other event type; accepted but not dispatched.
	Unhandled {
		/// The `type` field as received.
		event_type: String,
	},
}
impl WebhookEvent {
	/// Parses a raw payload. Unhandled types skip validation of `data` entirely.
	pub fn parse(payload: &[u8]) -> Result<Self, EventError> {
		let envelope = serde_json::from_slice::<Envelope>(payload)
			.map_err(|source| EventError::InvalidJson { source })?;
		let event_type = present(envelope.event_type).ok_or(EventError::MissingType)?;

		match event_type.as_str() {
			"user.created" => Ok(Self::UserCreated(UserData::from_value(envelope.data)?.profile()?)),
			"user.updated" => Ok(Self::UserUpdated(UserData::from_value(envelope.data)?.profile()?)),
			"user.deleted" => {
				let id = present(UserData::from_value(envelope.data)?.id)
					.ok_or(EventError::MissingDeletedUserId)?;

				Ok(Self::UserDeleted { id })
			},
			_ => Ok(Self::Unhandled { event_type }),
		}
	}

	/// Event type label.
	pub fn event_type(&self) -> &str {
		match self {
			Self::UserCreated(_) => "user.created",
			Self::UserUpdated(_) => "user.updated",
			Self::UserDeleted { .. } => "user.deleted",
			Self::Unhandled { event_type } => event_type,
		}
	}
}

/// Malformed-input failures; each maps to a 400 response carrying its message.
#[derive(Debug, ThisError)]
pub enum EventError {
	/// Payload is not a JSON object of the expected shape.
	#[error("Invalid JSON payload")]
	InvalidJson {
		/// Parser failure.
		#[source]
		source: serde_json::Error,
	},
	/// `type` is absent or empty.
	#[error("Missing event type")]
	MissingType,
	/// `data` has the wrong shape (for example `email_addresses` is not a list).
	#[error("Invalid event data at `{}`", .source.path())]
	InvalidData {
		/// Failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// `data.id` is absent or empty on a create/update event.
	#[error("Missing user ID")]
	MissingUserId,
	/// `data.id` is absent or empty on a delete event.
	#[error("Missing user ID in deletion payload")]
	MissingDeletedUserId,
	/// `data.primary_email_address_id` is absent or empty.
	#[error("No primary email ID found")]
	MissingPrimaryEmailId,
	/// No entry of `data.email_addresses` carries the primary email id.
	#[error("Primary email address not found in list")]
	PrimaryEmailNotFound,
	/// The primary email entry has no address.
	#[error("Primary email address is empty")]
	EmptyPrimaryEmail,
}

#[derive(Deserialize)]
struct Envelope {
	#[serde(default, rename = "type")]
	event_type: Option<String>,
	#[serde(default)]
	data: serde_json::Value,
}

#[derive(Default, Deserialize)]
struct UserData {
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	username: Option<String>,
	#[serde(default)]
	primary_email_address_id: Option<String>,
	#[serde(default)]
	email_addresses: Option<Vec<EmailAddress>>,
}
impl UserData {
	fn from_value(data: serde_json::Value) -> Result<Self, EventError> {
		if data.is_null() {
			return Ok(Self::default());
		}

		serde_path_to_error::deserialize(data).map_err(|source| EventError::InvalidData { source })
	}

	fn profile(self) -> Result<UserProfile, EventError> {
		let id = present(self.id).ok_or(EventError::MissingUserId)?;
		let primary_id =
			present(self.primary_email_address_id).ok_or(EventError::MissingPrimaryEmailId)?;
		let email = self
			.email_addresses
			.unwrap_or_default()
			.into_iter()
			.find(|entry| entry.id.as_deref() == Some(primary_id.as_str()))
			.ok_or(EventError::PrimaryEmailNotFound)?
			.email_address;
		let email = present(email).ok_or(EventError::EmptyPrimaryEmail)?;

		Ok(UserProfile { id, email, username: present(self.username) })
	}
}

#[derive(Deserialize)]
struct EmailAddress {
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	email_address: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.is_empty())
}
