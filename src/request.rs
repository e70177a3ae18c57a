//! Synthetic payment intent requests.
//!
//! Every iteration of a [`VirtualUser`](../user/struct.VirtualUser.html) builds one
//! [`RequestRecord`] with a [`RequestGenerator`]. The generator owns the user's random
//! number generator, so two users never contend on shared randomness, and a load test
//! run with `--seed` produces the same amounts, scenarios and webhook targets every
//! time.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Builder;

/// Smallest generated amount, inclusive.
pub const MIN_AMOUNT: u64 = 10_000;
/// Largest generated amount, exclusive.
pub const MAX_AMOUNT: u64 = 110_000;

/// How the payment simulator should resolve the intent.
#[derive(
    AsRefStr, Display, EnumIter, EnumString, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Approve,
    Fail,
    Delay,
    Random,
}

/// Where the payment simulator should deliver its webhook.
#[derive(
    AsRefStr, Display, EnumIter, EnumString, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum WebhookTarget {
    #[strum(serialize = "http://httpbin.org/post")]
    #[serde(rename = "http://httpbin.org/post")]
    Httpbin,
    #[strum(serialize = "https://webhook.site/test")]
    #[serde(rename = "https://webhook.site/test")]
    WebhookSite,
    /// Mock webhook endpoint running next to the simulator.
    #[strum(serialize = "http://localhost:8081/webhook")]
    #[serde(rename = "http://localhost:8081/webhook")]
    Local,
}

/// Free-form details attached to every generated intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub test_run: bool,
    /// Index of the user that built the request.
    pub vu: usize,
    /// Iteration of that user, starting at 0.
    pub iteration: usize,
    /// RFC 3339 time the request was built.
    pub timestamp: String,
}

/// One payment intent creation request.
///
/// Serializes to the JSON body expected by `POST /v1/sim/intent`; the idempotency key
/// travels as a header instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub reservation_id: String,
    pub amount: u64,
    pub scenario: Scenario,
    pub webhook_url: WebhookTarget,
    pub metadata: RequestMetadata,
    #[serde(skip)]
    pub idempotency_key: String,
}

/// Builds [`RequestRecord`]s with controlled randomness.
///
/// # Example
/// ```rust
/// use stampede::request::{RequestGenerator, MIN_AMOUNT, MAX_AMOUNT};
///
/// let mut generator = RequestGenerator::new(1, Some(42));
/// let record = generator.generate(1, 0, chrono::Utc::now());
///
/// assert!(record.reservation_id.starts_with("rsv_"));
/// assert!(record.reservation_id.ends_with("_1_0"));
/// assert!(record.amount >= MIN_AMOUNT && record.amount < MAX_AMOUNT);
/// assert_eq!(record.idempotency_key.len(), 36);
/// ```
#[derive(Debug)]
pub struct RequestGenerator {
    rng: StdRng,
    scenarios: Vec<Scenario>,
    webhooks: Vec<WebhookTarget>,
}
impl RequestGenerator {
    /// Create the generator for one user.
    ///
    /// With a seed the user's random sequence is derived from `seed + user`, otherwise
    /// it is seeded from the operating system.
    pub fn new(user: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user as u64)),
            None => StdRng::from_os_rng(),
        };
        RequestGenerator {
            rng,
            scenarios: Scenario::iter().collect(),
            webhooks: WebhookTarget::iter().collect(),
        }
    }

    /// Build the request for `iteration` of `user`, stamped with `now`.
    pub fn generate(&mut self, user: usize, iteration: usize, now: DateTime<Utc>) -> RequestRecord {
        let scenario = *self
            .scenarios
            .choose(&mut self.rng)
            .unwrap_or(&Scenario::Approve);
        let webhook_url = *self
            .webhooks
            .choose(&mut self.rng)
            .unwrap_or(&WebhookTarget::Local);
        RequestRecord {
            reservation_id: format!("rsv_{}_{}_{}", now.timestamp_millis(), user, iteration),
            amount: self.rng.random_range(MIN_AMOUNT..MAX_AMOUNT),
            scenario,
            webhook_url,
            metadata: RequestMetadata {
                test_run: true,
                vu: user,
                iteration,
                timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            idempotency_key: self.idempotency_key(now),
        }
    }

    /// Build an idempotency key: a version 7 UUID carrying 48 bits of unix milliseconds
    /// followed by random bits drawn from this user's rng.
    pub fn idempotency_key(&mut self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis().max(0) as u64;
        let mut random = [0u8; 10];
        self.rng.fill(&mut random);
        Builder::from_unix_timestamp_millis(millis, &random)
            .into_uuid()
            .to_string()
    }
}
