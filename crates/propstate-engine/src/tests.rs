//! Engine tests against an in-memory SQLite store.

use std::{
  collections::BTreeMap,
  sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
  },
};

use chrono::Utc;
use propstate_codec::{KeyMaterial, Keyring};
use propstate_core::{
  field::Field,
  lifecycle::{AddressView, NewTransition, PropertyView, TransitionRecord},
  outcome::{Rejection, StatusDecision},
  property::{Address, PropertyState},
  request::PropertyUpdateRequest,
  source::Source,
  status::{PropertyStatus, is_legal},
  store::{CountFilter, PropertyQuery, PropertyStore, WriteOutcome},
  trust::{Resolution, TrustPolicy},
};
use propstate_store_sqlite::SqliteStore;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{Engine, EngineConfig, Error};

fn keyring(seed: u8) -> Keyring { Keyring::new(KeyMaterial::from_bytes([seed; 32]), []) }

async fn shared_store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn engine_over(store: Arc<SqliteStore>, keyring: Keyring) -> Engine<SqliteStore> {
  Engine::new(
    store,
    Arc::new(keyring),
    Arc::new(TrustPolicy::default()),
    EngineConfig::default(),
  )
}

async fn engine() -> Engine<SqliteStore> { engine_over(shared_store().await, keyring(7)) }

fn new_listing(source: impl Into<Source>, listing_id: &str) -> PropertyUpdateRequest {
  PropertyUpdateRequest {
    address: Some(Address::new("123 Main St")),
    city: Some("Houston".into()),
    price: Some(300_000.0),
    ..PropertyUpdateRequest::for_listing(source, listing_id)
  }
}

fn price_update(source: impl Into<Source>, listing_id: &str, price: f64) -> PropertyUpdateRequest {
  PropertyUpdateRequest {
    price: Some(price),
    ..PropertyUpdateRequest::for_listing(source, listing_id)
  }
}

fn status_update(
  source: impl Into<Source>,
  listing_id: &str,
  status: PropertyStatus,
) -> PropertyUpdateRequest {
  PropertyUpdateRequest {
    status: Some(status),
    ..PropertyUpdateRequest::for_listing(source, listing_id)
  }
}

/// A SQLite store that reports a lost race on the next `lose_next`
/// conditional updates before letting writes through.
struct Contended {
  inner:  SqliteStore,
  losses: AtomicU32,
}

impl Contended {
  async fn new() -> Self {
    let inner = SqliteStore::open_in_memory().await.expect("in-memory store");
    Self { inner, losses: AtomicU32::new(0) }
  }

  fn lose_next(&self, n: u32) { self.losses.store(n, Ordering::SeqCst); }
}

impl PropertyStore for Contended {
  type Error = propstate_store_sqlite::Error;

  async fn get_by_id(&self, id: Uuid) -> Result<Option<PropertyState>, Self::Error> {
    self.inner.get_by_id(id).await
  }

  async fn get_by_listing_id(
    &self,
    listing_id: &str,
  ) -> Result<Option<PropertyState>, Self::Error> {
    self.inner.get_by_listing_id(listing_id).await
  }

  async fn list_by_status(
    &self,
    status: PropertyStatus,
  ) -> Result<Vec<PropertyState>, Self::Error> {
    self.inner.list_by_status(status).await
  }

  async fn list(&self, query: &PropertyQuery) -> Result<Vec<PropertyState>, Self::Error> {
    self.inner.list(query).await
  }

  async fn transitions(&self, id: Uuid) -> Result<Vec<TransitionRecord>, Self::Error> {
    self.inner.transitions(id).await
  }

  async fn create(
    &self,
    state: PropertyState,
    transitions: Vec<NewTransition>,
  ) -> Result<WriteOutcome, Self::Error> {
    self.inner.create(state, transitions).await
  }

  async fn conditional_update(
    &self,
    id: Uuid,
    expected_version: u64,
    state: PropertyState,
    transitions: Vec<NewTransition>,
  ) -> Result<WriteOutcome, Self::Error> {
    let lost = self
      .losses
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if lost {
      return Ok(WriteOutcome::Conflict);
    }
    self
      .inner
      .conditional_update(id, expected_version, state, transitions)
      .await
  }

  async fn count_by(&self, filter: &CountFilter) -> Result<u64, Self::Error> {
    self.inner.count_by(filter).await
  }

  async fn status_counts(&self) -> Result<BTreeMap<PropertyStatus, u64>, Self::Error> {
    self.inner.status_counts().await
  }

  async fn average_price(
    &self,
    statuses: &[PropertyStatus],
  ) -> Result<Option<f64>, Self::Error> {
    self.inner.average_price(statuses).await
  }
}

async fn contended_engine() -> (Arc<Contended>, Engine<Contended>) {
  let store = Arc::new(Contended::new().await);
  let e = Engine::new(
    store.clone(),
    Arc::new(keyring(7)),
    Arc::new(TrustPolicy::default()),
    EngineConfig::default(),
  );
  (store, e)
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_sighting_creates_a_sealed_record() {
  let e = engine().await;
  let (state, outcome) = e.reconcile(new_listing("scraper", "MLS123")).await.unwrap();

  assert!(outcome.created);
  assert_eq!(outcome.version, 1);
  assert_eq!(state.version, 1);
  assert_eq!(state.status, PropertyStatus::PendingImages);
  assert_eq!(outcome.status, StatusDecision::NotRequested);
  assert!(outcome.was_applied(Field::Address));
  assert!(outcome.was_applied(Field::Price));

  let sealed = state.address.clone().unwrap();
  assert!(!sealed.as_str().contains("Main St"));

  let view = e.get_by_listing_id("MLS123").await.unwrap().unwrap();
  assert_eq!(view.address.as_plaintext(), Some("123 Main St"));
  assert_eq!(view.attributes.price, Some(300_000.0));

  let log = e.transitions(state.id).await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].from, None);
  assert_eq!(log[0].to, PropertyStatus::PendingImages);
  assert_eq!(log[0].source, Source::Syndication);
}

#[tokio::test]
async fn creation_needs_a_listing_id_and_an_address() {
  let e = engine().await;

  let no_address = price_update("scraper", "MLS1", 1.0);
  assert!(matches!(e.reconcile(no_address).await, Err(Error::Validation(_))));

  let by_unknown_id = PropertyUpdateRequest {
    id: Some(Uuid::new_v4()),
    ..PropertyUpdateRequest::new("scraper")
  };
  assert!(matches!(e.reconcile(by_unknown_id).await, Err(Error::NotFound(_))));

  assert!(e.get_by_listing_id("MLS1").await.unwrap().is_none());
}

#[tokio::test]
async fn status_claim_on_creation_is_logged_after_the_initial_status() {
  let e = engine().await;
  let request = PropertyUpdateRequest {
    status: Some(PropertyStatus::Active),
    ..new_listing("scraper", "MLS1")
  };
  let (state, outcome) = e.reconcile(request).await.unwrap();

  assert_eq!(state.status, PropertyStatus::Active);
  assert!(outcome.status_accepted());
  let steps: Vec<_> = e
    .transitions(state.id)
    .await
    .unwrap()
    .into_iter()
    .map(|t| (t.seq, t.from, t.to))
    .collect();
  assert_eq!(steps, vec![
    (1, None, PropertyStatus::PendingImages),
    (2, Some(PropertyStatus::PendingImages), PropertyStatus::Active),
  ]);
}

// ─── Idempotence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn replaying_a_request_changes_nothing() {
  let e = engine().await;
  let request = PropertyUpdateRequest {
    status: Some(PropertyStatus::Active),
    media: Some(vec!["a.jpg".into()]),
    ..new_listing("scraper", "MLS1")
  };
  let (first, _) = e.reconcile(request.clone()).await.unwrap();
  let (second, outcome) = e.reconcile(request).await.unwrap();

  assert!(outcome.is_noop());
  assert!(!outcome.created);
  assert_eq!(outcome.version, 1);
  assert_eq!(outcome.status, StatusDecision::Unchanged);
  assert!(outcome.unchanged.contains(&Field::Address));
  assert!(outcome.unchanged.contains(&Field::Media));
  assert_eq!(first, second);
  assert_eq!(e.transitions(first.id).await.unwrap().len(), 2);
}

// ─── Trust ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_feed_price_beats_crm_when_it_arrives_first() {
  let e = engine().await;
  e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let (state, outcome) = e.reconcile(price_update("crm", "MLS1", 280_000.0)).await.unwrap();

  assert_eq!(state.attributes.price, Some(300_000.0));
  assert_eq!(
    outcome.rejection(Field::Price),
    Some(&Rejection::Outranked { holder: Source::Syndication })
  );
  assert_eq!(state.version, 1);
}

#[tokio::test]
async fn listing_feed_price_beats_crm_when_it_arrives_second() {
  let e = engine().await;
  let request = PropertyUpdateRequest {
    price: Some(280_000.0),
    ..new_listing("fub", "MLS2")
  };
  e.reconcile(request).await.unwrap();

  let (state, outcome) = e.reconcile(price_update("har", "MLS2", 300_000.0)).await.unwrap();

  assert!(outcome.was_applied(Field::Price));
  assert_eq!(state.attributes.price, Some(300_000.0));
  assert_eq!(state.version, 2);
  assert_eq!(
    state.provenance_of(Field::Price).map(|p| &p.source),
    Some(&Source::Syndication)
  );
}

#[tokio::test]
async fn unknown_sources_fill_gaps_but_never_override() {
  let e = engine().await;
  let (created, outcome) = e
    .reconcile(new_listing("zillow-bridge", "MLS3"))
    .await
    .unwrap();
  assert!(outcome.created);
  assert_eq!(
    created.provenance_of(Field::Price).map(|p| &p.source),
    Some(&Source::Unknown("zillow-bridge".into()))
  );

  // Any named source outranks it.
  let (_, outcome) = e.reconcile(price_update("booking", "MLS3", 1.0)).await.unwrap();
  assert!(outcome.was_applied(Field::Price));

  let retry = PropertyUpdateRequest {
    bedrooms: Some(3),
    ..price_update("zillow-bridge", "MLS3", 2.0)
  };
  let (state, outcome) = e.reconcile(retry).await.unwrap();
  assert_eq!(
    outcome.rejection(Field::Price),
    Some(&Rejection::Outranked { holder: Source::Booking })
  );
  assert!(outcome.was_applied(Field::Bedrooms));
  assert_eq!(state.attributes.price, Some(1.0));
  assert_eq!(state.attributes.bedrooms, Some(3));
}

#[tokio::test]
async fn unknown_sources_cannot_replace_values_from_unranked_known_sources() {
  let e = engine().await;
  let request = PropertyUpdateRequest {
    listing_agent: Some("Crm Agent".into()),
    ..new_listing("crm", "MLSP")
  };
  e.reconcile(request).await.unwrap();

  let spoof = PropertyUpdateRequest {
    listing_agent: Some("Spoofed".into()),
    listing_office: Some("Elsewhere Realty".into()),
    ..PropertyUpdateRequest::for_listing("zillow-bridge", "MLSP")
  };
  let (state, outcome) = e.reconcile(spoof).await.unwrap();

  assert_eq!(state.attributes.listing_agent.as_deref(), Some("Crm Agent"));
  assert_eq!(
    outcome.rejection(Field::ListingAgent),
    Some(&Rejection::Outranked { holder: Source::Crm })
  );
  // Unset fields are still filled.
  assert!(outcome.was_applied(Field::ListingOffice));
  assert_eq!(
    state.provenance_of(Field::ListingAgent).map(|p| &p.source),
    Some(&Source::Crm)
  );
}

#[tokio::test]
async fn internal_notes_are_admin_only() {
  let e = engine().await;
  e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let crm = PropertyUpdateRequest {
    internal_notes: Some("call the owner".into()),
    ..PropertyUpdateRequest::for_listing("crm", "MLS1")
  };
  let (_, outcome) = e.reconcile(crm).await.unwrap();
  assert_eq!(outcome.rejection(Field::InternalNotes), Some(&Rejection::AdministrativeOnly));

  let admin = PropertyUpdateRequest {
    internal_notes: Some("keys with the neighbour".into()),
    ..PropertyUpdateRequest::for_listing("manual", "MLS1")
  };
  let (state, outcome) = e.reconcile(admin).await.unwrap();
  assert!(outcome.was_applied(Field::InternalNotes));
  assert_eq!(state.attributes.internal_notes.as_deref(), Some("keys with the neighbour"));
  assert!(state.provenance_of(Field::InternalNotes).is_none());
}

#[tokio::test]
async fn media_is_merged_as_a_union() {
  let e = engine().await;
  let request = PropertyUpdateRequest {
    media: Some(vec!["a.jpg".into(), "b.jpg".into()]),
    ..new_listing("scraper", "MLS1")
  };
  e.reconcile(request).await.unwrap();

  let crm = PropertyUpdateRequest {
    media: Some(vec!["b.jpg".into(), "c.jpg".into()]),
    ..PropertyUpdateRequest::for_listing("crm", "MLS1")
  };
  let (state, _) = e.reconcile(crm).await.unwrap();
  assert_eq!(state.attributes.media, vec!["a.jpg", "b.jpg", "c.jpg"]);

  let booking_clear = PropertyUpdateRequest {
    clear_media: true,
    ..PropertyUpdateRequest::for_listing("booking", "MLS1")
  };
  let (state, outcome) = e.reconcile(booking_clear).await.unwrap();
  assert!(outcome.is_noop());
  assert!(outcome.rejection(Field::Media).is_some());
  assert_eq!(state.attributes.media.len(), 3);

  let admin_replace = PropertyUpdateRequest {
    clear_media: true,
    media: Some(vec!["z.jpg".into()]),
    ..PropertyUpdateRequest::for_listing("admin", "MLS1")
  };
  let (state, _) = e.reconcile(admin_replace).await.unwrap();
  assert_eq!(state.attributes.media, vec!["z.jpg"]);
}

// ─── Status lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn illegal_transition_still_applies_other_fields() {
  let e = engine().await;
  e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let request = PropertyUpdateRequest {
    description: Some("Corner lot".into()),
    ..status_update("scraper", "MLS1", PropertyStatus::Sold)
  };
  let (state, outcome) = e.reconcile(request).await.unwrap();

  assert_eq!(state.status, PropertyStatus::PendingImages);
  assert_eq!(outcome.status, StatusDecision::Rejected { requested: PropertyStatus::Sold });
  assert_eq!(
    outcome.rejection(Field::Status),
    Some(&Rejection::IllegalTransition {
      from: PropertyStatus::PendingImages,
      to:   PropertyStatus::Sold,
    })
  );
  assert_eq!(state.attributes.description.as_deref(), Some("Corner lot"));
  assert_eq!(state.version, 2);
  assert_eq!(e.transitions(state.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn every_illegal_transition_keeps_status_and_applies_other_fields() {
  let store = shared_store().await;
  let e = engine_over(store.clone(), keyring(7));

  let mut checked = 0;
  for from in PropertyStatus::ALL {
    for to in PropertyStatus::ALL {
      if from == to || is_legal(from, to) {
        continue;
      }
      let listing = format!("{from}-{to}");
      let (created, _) = e.reconcile(new_listing("scraper", &listing)).await.unwrap();

      let mut version = created.version;
      if from != created.status {
        let seeded = PropertyState { status: from, ..created };
        match store.conditional_update(seeded.id, version, seeded, vec![]).await.unwrap() {
          WriteOutcome::Committed(stored) => version = stored.version,
          WriteOutcome::Conflict => panic!("seeding {listing} conflicted"),
        }
      }

      let description = format!("moving toward {to}");
      let request = PropertyUpdateRequest {
        description: Some(description.clone()),
        ..status_update("scraper", &listing, to)
      };
      let (state, outcome) = e.reconcile(request).await.unwrap();

      assert_eq!(state.status, from, "{listing}");
      assert_eq!(outcome.status, StatusDecision::Rejected { requested: to }, "{listing}");
      assert_eq!(
        outcome.rejection(Field::Status),
        Some(&Rejection::IllegalTransition { from, to }),
        "{listing}"
      );
      assert!(outcome.was_applied(Field::Description), "{listing}");
      assert_eq!(state.attributes.description.as_deref(), Some(description.as_str()));
      assert_eq!(state.version, version + 1, "{listing}");
      checked += 1;
    }
  }
  assert!(checked > 0);
}

#[tokio::test]
async fn terminal_records_stay_terminal() {
  let e = engine().await;
  e.reconcile(PropertyUpdateRequest {
    status: Some(PropertyStatus::Active),
    ..new_listing("scraper", "MLS1")
  })
  .await
  .unwrap();
  e.reconcile(status_update("scraper", "MLS1", PropertyStatus::Sold))
    .await
    .unwrap();

  for status in [PropertyStatus::Active, PropertyStatus::Pending, PropertyStatus::Withdrawn] {
    let (state, outcome) = e.reconcile(status_update("admin", "MLS1", status)).await.unwrap();
    assert_eq!(state.status, PropertyStatus::Sold);
    assert!(!outcome.status_accepted());
  }

  let sold = e.list_by_status(PropertyStatus::Sold).await.unwrap();
  assert_eq!(sold.len(), 1);
  let log = e.transitions(sold[0].id).await.unwrap();
  assert_eq!(log.last().map(|t| t.to), Some(PropertyStatus::Sold));
}

#[tokio::test]
async fn lower_ranked_sources_cannot_move_status() {
  let e = engine().await;
  e.reconcile(PropertyUpdateRequest {
    status: Some(PropertyStatus::Active),
    ..new_listing("scraper", "MLS1")
  })
  .await
  .unwrap();

  let (state, outcome) = e
    .reconcile(status_update("crm", "MLS1", PropertyStatus::Pending))
    .await
    .unwrap();
  assert_eq!(state.status, PropertyStatus::Active);
  assert_eq!(
    outcome.rejection(Field::Status),
    Some(&Rejection::Outranked { holder: Source::Syndication })
  );
}

#[tokio::test]
async fn active_reads_include_available() {
  let e = engine().await;
  for (listing, status) in [
    ("A", PropertyStatus::Active),
    ("B", PropertyStatus::Available),
    ("C", PropertyStatus::Withdrawn),
  ] {
    e.reconcile(PropertyUpdateRequest { status: Some(status), ..new_listing("scraper", listing) })
      .await
      .unwrap();
  }
  e.reconcile(new_listing("scraper", "D")).await.unwrap();

  assert_eq!(e.list_by_status(PropertyStatus::Active).await.unwrap().len(), 2);
  assert_eq!(e.list_by_status(PropertyStatus::Available).await.unwrap().len(), 2);

  let mut public: Vec<_> = e
    .list_public()
    .await
    .unwrap()
    .into_iter()
    .filter_map(|v| v.listing_id)
    .collect();
  public.sort();
  assert_eq!(public, vec!["A", "B"]);
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_can_be_addressed_by_internal_id() {
  let e = engine().await;
  let (created, _) = e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let by_id = PropertyUpdateRequest {
    id: Some(created.id),
    bedrooms: Some(4),
    ..PropertyUpdateRequest::new("scraper")
  };
  let (state, outcome) = e.reconcile(by_id).await.unwrap();
  assert!(outcome.was_applied(Field::Bedrooms));
  assert_eq!(state.id, created.id);
  assert_eq!(state.listing_id.as_deref(), Some("MLS1"));
}

#[tokio::test]
async fn conflicting_identifiers_are_rejected() {
  let e = engine().await;
  let (first, _) = e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();
  e.reconcile(new_listing("scraper", "MLS2")).await.unwrap();

  let crossed = PropertyUpdateRequest { id: Some(first.id), ..price_update("admin", "MLS2", 1.0) };
  assert!(matches!(e.reconcile(crossed).await, Err(Error::Validation(_))));

  let relisted = PropertyUpdateRequest { id: Some(first.id), ..price_update("admin", "MLS9", 1.0) };
  assert!(matches!(e.reconcile(relisted).await, Err(Error::Validation(_))));
}

#[tokio::test]
async fn listing_id_is_attached_to_a_record_that_lacks_one() {
  let store = shared_store().await;
  let e = engine_over(store.clone(), keyring(7));

  let orphan = PropertyState::blank(Uuid::new_v4(), None, Utc::now());
  let WriteOutcome::Committed(orphan) = store.create(orphan, vec![]).await.unwrap() else {
    panic!("create failed");
  };

  let request = PropertyUpdateRequest { id: Some(orphan.id), ..price_update("crm", "MLS7", 1.0) };
  let (state, outcome) = e.reconcile(request).await.unwrap();
  assert!(outcome.was_applied(Field::ListingId));
  assert_eq!(state.listing_id.as_deref(), Some("MLS7"));
  assert_eq!(e.get_by_listing_id("MLS7").await.unwrap().map(|v| v.id), Some(orphan.id));
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_updates_all_land() {
  const N: u32 = 8;
  let config = EngineConfig { max_retries: N, ..EngineConfig::default() };
  let e = Arc::new(Engine::new(
    shared_store().await,
    Arc::new(keyring(7)),
    Arc::new(TrustPolicy::default()),
    config,
  ));
  let (created, _) = e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let mut handles = Vec::new();
  for i in 0..N {
    let e = e.clone();
    let mut request = PropertyUpdateRequest::for_listing("admin", "MLS1");
    match i {
      0 => request.state = Some("TX".into()),
      1 => request.postal_code = Some("77001".into()),
      2 => request.bedrooms = Some(3),
      3 => request.bathrooms = Some(2.5),
      4 => request.square_feet = Some(1_800),
      5 => request.property_type = Some("single_family".into()),
      6 => request.description = Some("Quiet street".into()),
      _ => request.source_url = Some("https://example.com/1".into()),
    }
    handles.push(tokio::spawn(async move { e.reconcile(request).await }));
  }
  for handle in handles {
    let (_, outcome) = handle.await.unwrap().unwrap();
    assert_eq!(outcome.applied.len(), 1);
  }

  let view = e.get_by_id(created.id).await.unwrap().unwrap();
  assert_eq!(view.version, 1 + u64::from(N));
  let a = &view.attributes;
  assert_eq!(a.state.as_deref(), Some("TX"));
  assert_eq!(a.postal_code.as_deref(), Some("77001"));
  assert_eq!(a.bedrooms, Some(3));
  assert_eq!(a.bathrooms, Some(2.5));
  assert_eq!(a.square_feet, Some(1_800));
  assert_eq!(a.property_type.as_deref(), Some("single_family"));
  assert_eq!(a.description.as_deref(), Some("Quiet street"));
  assert!(a.source_url.is_some());
}

#[tokio::test]
async fn lost_races_are_retried_up_to_the_bound() {
  let max = EngineConfig::default().max_retries;
  for losses in 1..=max {
    let (store, e) = contended_engine().await;
    e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

    store.lose_next(losses);
    let (state, outcome) = e
      .reconcile(price_update("scraper", "MLS1", 250_000.0))
      .await
      .unwrap();
    assert_eq!(outcome.retries, losses);
    assert_eq!(state.version, 2);
    assert_eq!(state.attributes.price, Some(250_000.0));
  }
}

#[tokio::test]
async fn lost_races_past_the_bound_fail_without_writing() {
  let max = EngineConfig::default().max_retries;
  let (store, e) = contended_engine().await;
  e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  store.lose_next(max + 1);
  let result = e.reconcile(price_update("scraper", "MLS1", 250_000.0)).await;
  assert!(matches!(
    result,
    Err(Error::ConcurrentUpdate { attempts }) if attempts == max + 1
  ));

  let view = e.get_by_listing_id("MLS1").await.unwrap().unwrap();
  assert_eq!(view.version, 1);
  assert_eq!(view.attributes.price, Some(300_000.0));
}

#[tokio::test]
async fn expired_deadline_times_out_without_writing() {
  let e = engine().await;
  let result = e
    .reconcile_until(new_listing("scraper", "MLS1"), Instant::now())
    .await;
  assert!(matches!(result, Err(Error::Timeout { retries: 0 })));
  assert!(e.get_by_listing_id("MLS1").await.unwrap().is_none());
}

// ─── Encryption ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unreadable_address_degrades_on_read_and_fails_on_write() {
  let store = shared_store().await;
  let writer = engine_over(store.clone(), keyring(7));
  let stranger = engine_over(store, keyring(8));

  let (created, _) = writer.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let view = stranger.get_by_id(created.id).await.unwrap().unwrap();
  assert_eq!(view.address, AddressView::Unavailable);
  assert_eq!(view.attributes.price, Some(300_000.0));

  let rewrite = PropertyUpdateRequest {
    address: Some(Address::new("9 Oak Ave")),
    ..PropertyUpdateRequest::for_listing("admin", "MLS1")
  };
  assert!(matches!(
    stranger.reconcile(rewrite).await,
    Err(Error::Decryption(id)) if id == created.id
  ));
}

#[tokio::test]
async fn rotated_keyring_still_reads_old_addresses() {
  let store = shared_store().await;
  let old = engine_over(store.clone(), keyring(7));
  let (created, _) = old.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  let rotated = Keyring::new(KeyMaterial::from_bytes([8u8; 32]), [KeyMaterial::from_bytes(
    [7u8; 32],
  )]);
  let new = engine_over(store, rotated);
  let view = new.get_by_id(created.id).await.unwrap().unwrap();
  assert_eq!(view.address.as_plaintext(), Some("123 Main St"));

  // Re-submitting the same address is recognised as unchanged.
  let (_, outcome) = new.reconcile(new_listing("scraper", "MLS1")).await.unwrap();
  assert!(outcome.unchanged.contains(&Field::Address));
}

// ─── Conflict resolution ─────────────────────────────────────────────────────

#[tokio::test]
async fn resolution_hands_a_field_to_another_source() {
  let e = engine().await;
  let request = PropertyUpdateRequest {
    listing_agent: Some("Dana".into()),
    ..new_listing("admin", "MLS1")
  };
  let (created, _) = e.reconcile(request).await.unwrap();

  let feed = PropertyUpdateRequest {
    listing_agent: Some("Robin".into()),
    ..PropertyUpdateRequest::for_listing("scraper", "MLS1")
  };
  let (_, outcome) = e.reconcile(feed.clone()).await.unwrap();
  assert_eq!(
    outcome.rejection(Field::ListingAgent),
    Some(&Rejection::Outranked { holder: Source::Admin })
  );

  let resolved = e
    .resolve_conflict(created.id, Field::ListingAgent, Resolution::SyndicationAuthoritative)
    .await
    .unwrap();
  assert_eq!(resolved.version, 2);
  assert_eq!(
    resolved.provenance_of(Field::ListingAgent).map(|p| &p.source),
    Some(&Source::Syndication)
  );

  let (state, outcome) = e.reconcile(feed).await.unwrap();
  assert!(outcome.was_applied(Field::ListingAgent));
  assert_eq!(state.attributes.listing_agent.as_deref(), Some("Robin"));
}

#[tokio::test]
async fn resolution_rejects_bad_targets() {
  let e = engine().await;
  let (created, _) = e.reconcile(new_listing("scraper", "MLS1")).await.unwrap();

  assert!(matches!(
    e.resolve_conflict(created.id, Field::InternalNotes, Resolution::ManualOverride)
      .await,
    Err(Error::Validation(_))
  ));
  assert!(matches!(
    e.resolve_conflict(Uuid::new_v4(), Field::Price, Resolution::ManualOverride)
      .await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(e.transitions(Uuid::new_v4()).await, Err(Error::NotFound(_))));
}

// ─── Public reads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_withheld_from_showings_are_not_public() {
  let e = engine().await;
  for (listing, showable) in [("A", None), ("B", Some(true)), ("C", Some(false))] {
    let request = PropertyUpdateRequest {
      status: Some(PropertyStatus::Active),
      available_for_showing: showable,
      ..new_listing("scraper", listing)
    };
    e.reconcile(request).await.unwrap();
  }

  let public_ids = |views: Vec<PropertyView>| {
    let mut ids: Vec<_> = views.into_iter().filter_map(|v| v.listing_id).collect();
    ids.sort();
    ids
  };
  assert_eq!(public_ids(e.list_public().await.unwrap()), vec!["A", "B"]);
  assert_eq!(e.list_by_status(PropertyStatus::Active).await.unwrap().len(), 3);

  let stats = e.refresh_stats().await.unwrap();
  assert_eq!(stats.public, 2);
  assert_eq!(stats.active, 3);

  let reopened = PropertyUpdateRequest {
    available_for_showing: Some(true),
    ..PropertyUpdateRequest::for_listing("scraper", "C")
  };
  e.reconcile(reopened).await.unwrap();
  assert_eq!(public_ids(e.list_public().await.unwrap()), vec!["A", "B", "C"]);
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_count_by_status_and_are_cached() {
  let e = engine().await;
  for (listing, status, price) in [
    ("A", Some(PropertyStatus::Active), 100_000.0),
    ("B", Some(PropertyStatus::Available), 300_000.0),
    ("C", None, 50_000.0),
  ] {
    let request = PropertyUpdateRequest {
      status,
      price: Some(price),
      ..new_listing("scraper", listing)
    };
    e.reconcile(request).await.unwrap();
  }

  let stats = e.stats().await.unwrap();
  assert_eq!(stats.total, 3);
  assert_eq!(stats.active, 2);
  assert_eq!(stats.public, 2);
  assert_eq!(stats.by_status.get(&PropertyStatus::PendingImages), Some(&1));
  assert_eq!(stats.average_active_price, Some(200_000.0));

  e.reconcile(new_listing("scraper", "D")).await.unwrap();
  assert_eq!(e.stats().await.unwrap().total, 3);
  assert_eq!(e.refresh_stats().await.unwrap().total, 4);

  let json = serde_json::to_value(&stats).unwrap();
  assert_eq!(json["by_status"]["active"], 1);
}
