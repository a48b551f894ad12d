// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Opaque keyset cursors: base64url (unpadded) JSON of the last item's
//! `(timestamp, id)` pair.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api_response::ApiError;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Cursor {
	#[serde(rename = "t")]
	at: DateTime<Utc>,
	#[serde(rename = "i")]
	id: String,
}

pub fn encode(at: DateTime<Utc>, id: &str) -> String {
	let cursor = Cursor {
		at,
		id: id.to_string(),
	};
	let raw = serde_json::to_vec(&cursor).expect("cursor serialization cannot fail");
	URL_SAFE_NO_PAD.encode(raw)
}

pub fn decode(raw: &str) -> Result<(DateTime<Utc>, String), ApiError> {
	let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| ApiError::BadCursor)?;
	let cursor: Cursor = serde_json::from_slice(&bytes).map_err(|_| ApiError::BadCursor)?;
	Ok((cursor.at, cursor.id))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_round_trip() {
		let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 45).unwrap();
		let encoded = encode(at, "job-123");
		let (decoded_at, decoded_id) = decode(&encoded).unwrap();
		assert_eq!(decoded_at, at);
		assert_eq!(decoded_id, "job-123");
	}

	#[test]
	fn test_garbage_rejected() {
		assert!(decode("!!!not-base64!!!").is_err());
		assert!(decode("bm90LWpzb24").is_err());
		assert!(decode("").is_err());
	}

	#[test]
	fn test_no_padding_in_output() {
		let encoded = encode(Utc::now(), "x");
		assert!(!encoded.contains('='));
	}
}
