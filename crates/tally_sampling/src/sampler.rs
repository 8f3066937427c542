//! Per-device sampler with a cached, period-scoped decision.
//!
//! One [`PerDeviceSampler`] is built per metric. It answers
//! [`PerDeviceSampler::should_log`] from its cache until the current stagger
//! period ends, so a device's decision never flickers mid-period.
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_sampling::{PerDeviceSampler, SamplingConfig, SystemClock};
//!
//! let sampler = PerDeviceSampler::new("job-execution", Some(config), SystemClock, provider);
//! if sampler.should_log().await? {
//!     stats.upload(record);
//! }
//! ```

use crate::clock::Clock;
use crate::config::SamplingConfig;
use crate::error::{Error, Result};
use crate::identity::SelectionIdSource;
use crate::selection::select;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Gate deciding whether a record should be logged.
pub trait Sampler: Send + Sync {
    /// Returns true if this device should log.
    fn should_log(&self) -> impl Future<Output = Result<bool>> + Send;
}

/// Sampler that logs everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLog;

impl Sampler for AlwaysLog {
    fn should_log(&self) -> impl Future<Output = Result<bool>> + Send {
        std::future::ready(Ok(true))
    }
}

impl<T: Sampler> Sampler for std::sync::Arc<T> {
    fn should_log(&self) -> impl Future<Output = Result<bool>> + Send {
        (**self).should_log()
    }
}

/// Tuning for [`PerDeviceSampler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerOptions {
    /// Deadline for resolving the selection id. `None` waits indefinitely.
    pub id_timeout: Option<Duration>,
}

impl SamplerOptions {
    /// Creates options with no deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self { id_timeout: None }
    }

    /// Sets the selection id resolution deadline.
    #[must_use]
    pub const fn with_id_timeout(mut self, timeout: Duration) -> Self {
        self.id_timeout = Some(timeout);
        self
    }
}

/// A decision and the instant it stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedDecision {
    /// Whether the device is in the cohort.
    pub should_select: bool,
    /// First instant at which the decision must be recomputed.
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SamplerState {
    selection_id: Option<i64>,
    decision: Option<CachedDecision>,
}

/// Stateful cohort sampler for one metric.
pub struct PerDeviceSampler<C, P> {
    metric: String,
    config: Option<SamplingConfig>,
    clock: C,
    ids: P,
    options: SamplerOptions,
    state: Mutex<SamplerState>,
}

impl<C, P> std::fmt::Debug for PerDeviceSampler<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerDeviceSampler")
            .field("metric", &self.metric)
            .field("config", &self.config)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: Clock, P: SelectionIdSource> PerDeviceSampler<C, P> {
    /// Creates a sampler. A missing config logs everything.
    pub fn new(
        metric: impl Into<String>,
        config: Option<SamplingConfig>,
        clock: C,
        ids: P,
    ) -> Self {
        Self {
            metric: metric.into(),
            config,
            clock,
            ids,
            options: SamplerOptions::new(),
            state: Mutex::new(SamplerState::default()),
        }
    }

    /// Replaces the sampler options.
    #[must_use]
    pub const fn with_options(mut self, options: SamplerOptions) -> Self {
        self.options = options;
        self
    }

    /// Name of the metric this sampler gates.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// The sampling configuration, if any.
    pub const fn config(&self) -> Option<&SamplingConfig> {
        self.config.as_ref()
    }

    /// Returns the cached decision, valid or not.
    pub async fn cached_decision(&self) -> Option<CachedDecision> {
        self.state.lock().await.decision
    }

    /// Returns true if this device should log the metric right now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the selection id cannot be resolved
    /// in time, or a selection error for out-of-range clock readings. The
    /// cache is left untouched on error.
    pub async fn should_log(&self) -> Result<bool> {
        let Some(config) = &self.config else {
            return Ok(true);
        };
        if config.selects_all() {
            return Ok(true);
        }
        if config.selects_none() {
            return Ok(false);
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        if let Some(decision) = state.decision {
            if now < decision.valid_until {
                return Ok(decision.should_select);
            }
        }

        let selection_id = match state.selection_id {
            Some(selection_id) => selection_id,
            None => self.resolve_selection_id().await?,
        };
        let selection = select(now, selection_id, config)?;

        debug!(
            metric = %self.metric,
            period_number = selection.period.period_number,
            selected = selection.selected,
            valid_until = %selection.period.stagger_period_end_time,
            "Recomputed sampling decision"
        );

        state.selection_id = Some(selection_id);
        state.decision = Some(CachedDecision {
            should_select: selection.selected,
            valid_until: selection.period.stagger_period_end_time,
        });
        Ok(selection.selected)
    }

    async fn resolve_selection_id(&self) -> Result<i64> {
        let Some(limit) = self.options.id_timeout else {
            return self.ids.selection_id().await;
        };
        if let Ok(resolved) = tokio::time::timeout(limit, self.ids.selection_id()).await {
            resolved
        } else {
            warn!(metric = %self.metric, "Timed out resolving selection id");
            Err(Error::Unavailable(format!(
                "selection id not resolved within {limit:?}"
            )))
        }
    }
}

impl<C: Clock, P: SelectionIdSource> Sampler for PerDeviceSampler<C, P> {
    fn should_log(&self) -> impl Future<Output = Result<bool>> + Send {
        Self::should_log(self)
    }
}
