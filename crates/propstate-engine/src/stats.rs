//! Aggregate statistics over the store, cached for a bounded time.
//!
//! Stats are eventually consistent with writes: a cached value is served
//! until it is older than the configured max age.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use propstate_core::{
  status::PropertyStatus,
  store::{CountFilter, PropertyStore},
};
use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyStats {
  pub total:                u64,
  pub by_status:            BTreeMap<PropertyStatus, u64>,
  /// Active records, including those stored as `available`.
  pub active:               u64,
  /// Records in a publicly listed status.
  pub public:               u64,
  pub average_active_price: Option<f64>,
  pub computed_at:          DateTime<Utc>,
}

pub struct StatsAggregator<S> {
  store:   Arc<S>,
  max_age: Duration,
  cached:  RwLock<Option<(Instant, PropertyStats)>>,
}

impl<S: PropertyStore> StatsAggregator<S> {
  pub fn new(store: Arc<S>, max_age: Duration) -> Self {
    Self { store, max_age, cached: RwLock::new(None) }
  }

  /// Cached stats, recomputed if older than the max age.
  pub async fn get(&self) -> Result<PropertyStats> {
    {
      let cached = self.cached.read().await;
      if let Some((at, stats)) = cached.as_ref() {
        if at.elapsed() < self.max_age {
          return Ok(stats.clone());
        }
      }
    }
    self.refresh().await
  }

  /// Recompute now and replace the cached value.
  pub async fn refresh(&self) -> Result<PropertyStats> {
    let stats = self.compute().await?;
    *self.cached.write().await = Some((Instant::now(), stats.clone()));
    debug!(total = stats.total, "stats recomputed");
    Ok(stats)
  }

  async fn compute(&self) -> Result<PropertyStats> {
    let active_set = PropertyStatus::Active.read_set();

    let total = self.store.count_by(&CountFilter::All).await.map_err(Error::store)?;
    let by_status = self.store.status_counts().await.map_err(Error::store)?;
    let active = self
      .store
      .count_by(&CountFilter::Statuses(active_set.to_vec()))
      .await
      .map_err(Error::store)?;
    let public = self
      .store
      .count_by(&CountFilter::Public)
      .await
      .map_err(Error::store)?;
    let average_active_price = self
      .store
      .average_price(active_set)
      .await
      .map_err(Error::store)?;

    Ok(PropertyStats {
      total,
      by_status,
      active,
      public,
      average_active_price,
      computed_at: Utc::now(),
    })
  }
}
