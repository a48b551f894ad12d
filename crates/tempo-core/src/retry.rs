// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use rand::Rng;

use crate::job::Backoff;

/// Default delay before the first retry.
pub const RETRY_BASE: Duration = Duration::from_secs(30);

/// Upper bound for any single retry delay.
const RETRY_CAP: Duration = Duration::from_secs(3600);

/// Delay before the next try of a job that has already failed
/// `retry_count` times.
///
/// Exponential doubles from `base`, caps at one hour and applies ±25%
/// jitter so a burst of failures does not retry in lockstep. Linear grows
/// by `base` per attempt with no jitter.
pub fn retry_delay(backoff: Backoff, retry_count: i32, base: Duration) -> Duration {
	let base_ms = base.as_millis() as i64;
	match backoff {
		Backoff::Exponential => {
			let exp = retry_count.clamp(0, 30) as u32;
			let delay_ms = base_ms
				.saturating_mul(1i64 << exp)
				.min(RETRY_CAP.as_millis() as i64);
			let quarter = delay_ms / 4;
			let jitter = rand::thread_rng().gen_range(-quarter..=quarter);
			Duration::from_millis((delay_ms + jitter).max(0) as u64)
		}
		Backoff::Linear => {
			let count = retry_count.max(0) as i64;
			Duration::from_millis((base_ms * (count + 1)) as u64)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_linear_grows_by_base() {
		let base = Duration::from_secs(30);
		assert_eq!(retry_delay(Backoff::Linear, 0, base), Duration::from_secs(30));
		assert_eq!(retry_delay(Backoff::Linear, 1, base), Duration::from_secs(60));
		assert_eq!(retry_delay(Backoff::Linear, 4, base), Duration::from_secs(150));
	}

	#[test]
	fn test_exponential_within_jitter_band() {
		let base = Duration::from_secs(30);
		for (retry_count, expected_secs) in [(0, 30u64), (1, 60), (2, 120), (3, 240)] {
			let delay = retry_delay(Backoff::Exponential, retry_count, base);
			let lo = Duration::from_millis(expected_secs * 1000 * 3 / 4);
			let hi = Duration::from_millis(expected_secs * 1000 * 5 / 4);
			assert!(
				delay >= lo && delay <= hi,
				"retry {retry_count}: {delay:?} outside [{lo:?}, {hi:?}]"
			);
		}
	}

	#[test]
	fn test_exponential_caps_at_one_hour() {
		let base = Duration::from_secs(30);
		for retry_count in [10, 20, 30, 100] {
			let delay = retry_delay(Backoff::Exponential, retry_count, base);
			// One hour cap plus the 25% jitter headroom.
			assert!(delay <= Duration::from_secs(4500), "retry {retry_count}: {delay:?}");
		}
	}

	#[test]
	fn test_negative_retry_count_clamped() {
		let base = Duration::from_secs(30);
		assert_eq!(retry_delay(Backoff::Linear, -3, base), Duration::from_secs(30));
		let delay = retry_delay(Backoff::Exponential, -3, base);
		assert!(delay <= Duration::from_secs(38));
	}
}

#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn prop_exponential_never_exceeds_cap_plus_jitter(retry_count in 0i32..100) {
			let delay = retry_delay(Backoff::Exponential, retry_count, RETRY_BASE);
			prop_assert!(delay <= Duration::from_secs(4500));
		}

		#[test]
		fn prop_linear_is_monotonic(retry_count in 0i32..100) {
			let a = retry_delay(Backoff::Linear, retry_count, RETRY_BASE);
			let b = retry_delay(Backoff::Linear, retry_count + 1, RETRY_BASE);
			prop_assert!(b > a);
		}
	}
}
