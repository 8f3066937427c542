//! Device selection identifiers.
//!
//! A selection id is generated once per device, persisted by an external
//! [`IdentifierStore`], and treated as opaque afterwards.

use crate::clock::Clock;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

/// Seed for xxhash when deriving a selection id.
const SELECTION_ID_SEED: u64 = 0x5345_4C45_4354; // "SELECT" in hex

/// Persistent storage for the device's selection id.
pub trait IdentifierStore: Send + Sync {
    /// Loads the stored id, if any.
    fn get(&self) -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Persists the id.
    fn set(&self, selection_id: i64) -> impl Future<Output = Result<()>> + Send;
}

impl<T: IdentifierStore> IdentifierStore for Arc<T> {
    fn get(&self) -> impl Future<Output = Result<Option<i64>>> + Send {
        (**self).get()
    }

    fn set(&self, selection_id: i64) -> impl Future<Output = Result<()>> + Send {
        (**self).set(selection_id)
    }
}

/// Anything that can resolve the device's selection id.
pub trait SelectionIdSource: Send + Sync {
    /// Returns the selection id, creating it on first use if needed.
    fn selection_id(&self) -> impl Future<Output = Result<i64>> + Send;
}

impl<T: SelectionIdSource> SelectionIdSource for Arc<T> {
    fn selection_id(&self) -> impl Future<Output = Result<i64>> + Send {
        (**self).selection_id()
    }
}

/// Derives a selection id from 128 random bits and the current time.
#[allow(clippy::cast_possible_wrap)]
pub fn generate_selection_id(random: u128, now: DateTime<Utc>) -> i64 {
    let mut input = [0u8; 24];
    input[..16].copy_from_slice(&random.to_le_bytes());
    input[16..].copy_from_slice(&now.timestamp_millis().to_le_bytes());
    xxh64(&input, SELECTION_ID_SEED) as i64
}

/// Loads the selection id from a store, generating and persisting it on
/// first use.
///
/// The id is resolved at most once per provider; a failed attempt leaves the
/// provider uninitialized so the next call tries again.
pub struct SelectionIdProvider<S, C> {
    store: S,
    clock: C,
    rng: Mutex<ChaCha8Rng>,
    resolved: OnceCell<i64>,
}

impl<S, C> std::fmt::Debug for SelectionIdProvider<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionIdProvider")
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}

impl<S: IdentifierStore, C: Clock> SelectionIdProvider<S, C> {
    /// Creates a provider whose generator is seeded from OS entropy.
    pub fn new(store: S, clock: C) -> Self {
        Self::with_rng(store, clock, ChaCha8Rng::from_entropy())
    }

    /// Creates a provider with a deterministic generator.
    pub fn with_seed(store: S, clock: C, seed: u64) -> Self {
        Self::with_rng(store, clock, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(store: S, clock: C, rng: ChaCha8Rng) -> Self {
        Self {
            store,
            clock,
            rng: Mutex::new(rng),
            resolved: OnceCell::new(),
        }
    }

    /// Returns the persisted selection id, creating one if the store is empty.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_or_create_selection_id(&self) -> Result<i64> {
        self.resolved
            .get_or_try_init(|| self.load_or_generate())
            .await
            .copied()
    }

    async fn load_or_generate(&self) -> Result<i64> {
        if let Some(selection_id) = self.store.get().await? {
            debug!("Loaded stored selection id");
            return Ok(selection_id);
        }

        let random: u128 = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen();
        let selection_id = generate_selection_id(random, self.clock.now());
        self.store.set(selection_id).await?;
        info!("Generated and persisted a new selection id");
        Ok(selection_id)
    }
}

impl<S: IdentifierStore, C: Clock> SelectionIdSource for SelectionIdProvider<S, C> {
    fn selection_id(&self) -> impl Future<Output = Result<i64>> + Send {
        self.get_or_create_selection_id()
    }
}
