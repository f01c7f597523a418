//! [`SqliteStore`], the SQLite implementation of [`PropertyStore`].

use std::{collections::BTreeMap, path::Path};

use propstate_core::{
  lifecycle::{NewTransition, TransitionRecord},
  property::PropertyState,
  status::PropertyStatus,
  store::{CountFilter, PropertyQuery, PropertyStore, WriteOutcome},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    PROPERTY_COLUMNS, RawProperty, RawTransition, decode_status, encode_dt,
    encode_status, encode_statuses, encode_uuid, placeholders,
  },
  schema::SCHEMA,
};

// ─── SQL ─────────────────────────────────────────────────────────────────────

const INSERT_PROPERTY: &str = "
  INSERT INTO properties (
    property_id, listing_id, address_sealed, city, state, postal_code,
    bedrooms, bathrooms, square_feet, property_type, price, description,
    media, listing_agent, listing_office, source_url, available_for_showing,
    internal_notes, status, provenance, version, created_at, updated_at
  ) VALUES (
    :property_id, :listing_id, :address_sealed, :city, :state, :postal_code,
    :bedrooms, :bathrooms, :square_feet, :property_type, :price, :description,
    :media, :listing_agent, :listing_office, :source_url, :available_for_showing,
    :internal_notes, :status, :provenance, :version, :created_at, :updated_at
  )";

// The version predicate is what makes this a compare-and-swap.
const UPDATE_PROPERTY: &str = "
  UPDATE properties SET
    listing_id = :listing_id, address_sealed = :address_sealed,
    city = :city, state = :state, postal_code = :postal_code,
    bedrooms = :bedrooms, bathrooms = :bathrooms, square_feet = :square_feet,
    property_type = :property_type, price = :price, description = :description,
    media = :media, listing_agent = :listing_agent,
    listing_office = :listing_office, source_url = :source_url,
    available_for_showing = :available_for_showing,
    internal_notes = :internal_notes, status = :status,
    provenance = :provenance, version = :version,
    created_at = :created_at, updated_at = :updated_at
  WHERE property_id = :property_id AND version = :expected_version";

fn row_params(raw: &RawProperty) -> Vec<(&'static str, &dyn rusqlite::ToSql)> {
  vec![
    (":property_id", &raw.property_id),
    (":listing_id", &raw.listing_id),
    (":address_sealed", &raw.address_sealed),
    (":city", &raw.city),
    (":state", &raw.state),
    (":postal_code", &raw.postal_code),
    (":bedrooms", &raw.bedrooms),
    (":bathrooms", &raw.bathrooms),
    (":square_feet", &raw.square_feet),
    (":property_type", &raw.property_type),
    (":price", &raw.price),
    (":description", &raw.description),
    (":media", &raw.media),
    (":listing_agent", &raw.listing_agent),
    (":listing_office", &raw.listing_office),
    (":source_url", &raw.source_url),
    (":available_for_showing", &raw.available_for_showing),
    (":internal_notes", &raw.internal_notes),
    (":status", &raw.status),
    (":provenance", &raw.provenance),
    (":version", &raw.version),
    (":created_at", &raw.created_at),
    (":updated_at", &raw.updated_at),
  ]
}

/// A transition encoded for the `status_transitions` table.
struct EncodedTransition {
  from:        Option<String>,
  to:          String,
  source:      String,
  recorded_at: String,
}

impl EncodedTransition {
  fn new(t: &NewTransition) -> Self {
    Self {
      from:        t.from.map(encode_status),
      to:          encode_status(t.to),
      source:      t.source.as_str().to_owned(),
      recorded_at: encode_dt(t.recorded_at),
    }
  }
}

/// Append transitions for `property_id`, continuing its sequence.
fn append_transitions(
  tx: &rusqlite::Transaction<'_>,
  property_id: &str,
  transitions: &[EncodedTransition],
) -> rusqlite::Result<()> {
  if transitions.is_empty() {
    return Ok(());
  }

  let last: i64 = tx.query_row(
    "SELECT COALESCE(MAX(seq), 0) FROM status_transitions WHERE property_id = ?1",
    rusqlite::params![property_id],
    |r| r.get(0),
  )?;

  for (offset, t) in transitions.iter().enumerate() {
    tx.execute(
      "INSERT INTO status_transitions
         (property_id, seq, from_status, to_status, source, recorded_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      rusqlite::params![
        property_id,
        last + 1 + offset as i64,
        t.from,
        t.to,
        t.source,
        t.recorded_at,
      ],
    )?;
  }
  Ok(())
}

/// Public listings leave out records explicitly withheld from showings.
const SHOWABLE: &str = "available_for_showing IS NOT 0";

/// Bind a page bound as an SQL integer.
fn page_bound(column: &'static str, value: usize) -> Result<i64> {
  i64::try_from(value).map_err(|_| Error::Corrupt { column, value: value.to_string() })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A property store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT {PROPERTY_COLUMNS} …` query with positional string params.
  async fn query_properties(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<PropertyState>> {
    let raws: Vec<RawProperty> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawProperty::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProperty::into_state).collect()
  }

  async fn query_one(&self, sql: String, param: String) -> Result<Option<PropertyState>> {
    let raw: Option<RawProperty> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![param], RawProperty::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProperty::into_state).transpose()
  }

  async fn count(&self, sql: String, params: Vec<String>) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?)
      })
      .await?;

    u64::try_from(count).map_err(|_| Error::Corrupt {
      column: "count",
      value:  count.to_string(),
    })
  }

  async fn count_statuses(&self, statuses: &[PropertyStatus]) -> Result<u64> {
    if statuses.is_empty() {
      return Ok(0);
    }
    let sql = format!(
      "SELECT COUNT(*) FROM properties WHERE status IN ({})",
      placeholders(1, statuses.len())
    );
    self.count(sql, encode_statuses(statuses)).await
  }
}

// ─── PropertyStore impl ──────────────────────────────────────────────────────

impl PropertyStore for SqliteStore {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_by_id(&self, id: Uuid) -> Result<Option<PropertyState>> {
    let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE property_id = ?1");
    self.query_one(sql, encode_uuid(id)).await
  }

  async fn get_by_listing_id(&self, listing_id: &str) -> Result<Option<PropertyState>> {
    let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE listing_id = ?1");
    self.query_one(sql, listing_id.to_owned()).await
  }

  async fn list_by_status(&self, status: PropertyStatus) -> Result<Vec<PropertyState>> {
    let query = PropertyQuery {
      statuses: status.read_set().to_vec(),
      ..PropertyQuery::default()
    };
    self.list(&query).await
  }

  async fn list(&self, query: &PropertyQuery) -> Result<Vec<PropertyState>> {
    let mut conditions = Vec::new();
    if !query.statuses.is_empty() {
      conditions.push(format!("status IN ({})", placeholders(1, query.statuses.len())));
    }
    if query.showable_only {
      conditions.push(SHOWABLE.to_owned());
    }
    let where_clause = if conditions.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conditions.join(" AND "))
    };
    // SQLite treats a negative LIMIT as "no limit".
    let limit = query.limit.map(|l| page_bound("limit", l)).transpose()?.unwrap_or(-1);
    let offset = page_bound("offset", query.offset.unwrap_or(0))?;

    let sql = format!(
      "SELECT {PROPERTY_COLUMNS} FROM properties
       {where_clause}
       ORDER BY created_at, property_id
       LIMIT {limit} OFFSET {offset}"
    );
    self.query_properties(sql, encode_statuses(&query.statuses)).await
  }

  async fn transitions(&self, id: Uuid) -> Result<Vec<TransitionRecord>> {
    let id_str = encode_uuid(id);

    let raws: Vec<RawTransition> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT property_id, seq, from_status, to_status, source, recorded_at
           FROM status_transitions
           WHERE property_id = ?1
           ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawTransition {
              property_id: row.get(0)?,
              seq:         row.get(1)?,
              from_status: row.get(2)?,
              to_status:   row.get(3)?,
              source:      row.get(4)?,
              recorded_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTransition::into_record).collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create(
    &self,
    state: PropertyState,
    transitions: Vec<NewTransition>,
  ) -> Result<WriteOutcome> {
    let raw = RawProperty::from_state(&state, 1)?;
    let encoded: Vec<EncodedTransition> =
      transitions.iter().map(EncodedTransition::new).collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match tx.execute(INSERT_PROPERTY, row_params(&raw).as_slice()) {
          Ok(_) => {}
          // The listing id is already taken.
          Err(e) if is_constraint_violation(&e) => return Ok(false),
          Err(e) => return Err(e.into()),
        }
        append_transitions(&tx, &raw.property_id, &encoded)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Ok(WriteOutcome::Conflict);
    }
    Ok(WriteOutcome::Committed(PropertyState { version: 1, ..state }))
  }

  async fn conditional_update(
    &self,
    id: Uuid,
    expected_version: u64,
    state: PropertyState,
    transitions: Vec<NewTransition>,
  ) -> Result<WriteOutcome> {
    let next_version = expected_version + 1;
    let raw = RawProperty::from_state(&PropertyState { id, ..state.clone() }, next_version)?;
    let expected = i64::try_from(expected_version).map_err(|_| Error::Corrupt {
      column: "version",
      value:  expected_version.to_string(),
    })?;
    let encoded: Vec<EncodedTransition> =
      transitions.iter().map(EncodedTransition::new).collect();

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut params = row_params(&raw);
        params.push((":expected_version", &expected));
        let changed = match tx.execute(UPDATE_PROPERTY, params.as_slice()) {
          Ok(changed) => changed,
          // A listing id claimed by another record since we read.
          Err(e) if is_constraint_violation(&e) => 0,
          Err(e) => return Err(e.into()),
        };
        if changed == 0 {
          return Ok(false);
        }
        append_transitions(&tx, &raw.property_id, &encoded)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !updated {
      return Ok(WriteOutcome::Conflict);
    }
    Ok(WriteOutcome::Committed(PropertyState { id, version: next_version, ..state }))
  }

  // ── Aggregates ────────────────────────────────────────────────────────────

  async fn count_by(&self, filter: &CountFilter) -> Result<u64> {
    match filter {
      CountFilter::All => self.count("SELECT COUNT(*) FROM properties".into(), vec![]).await,
      CountFilter::Statuses(statuses) => self.count_statuses(statuses).await,
      CountFilter::Public => {
        let sql = format!(
          "SELECT COUNT(*) FROM properties WHERE status IN ({}) AND {SHOWABLE}",
          placeholders(1, PropertyStatus::PUBLIC.len())
        );
        self.count(sql, encode_statuses(&PropertyStatus::PUBLIC)).await
      }
    }
  }

  async fn status_counts(&self) -> Result<BTreeMap<PropertyStatus, u64>> {
    let rows: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT status, COUNT(*) FROM properties GROUP BY status")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(status, count)| {
        let count = u64::try_from(count).map_err(|_| Error::Corrupt {
          column: "count",
          value:  count.to_string(),
        })?;
        Ok((decode_status(&status)?, count))
      })
      .collect()
  }

  async fn average_price(&self, statuses: &[PropertyStatus]) -> Result<Option<f64>> {
    if statuses.is_empty() {
      return Ok(None);
    }
    let sql = format!(
      "SELECT AVG(price) FROM properties
       WHERE price IS NOT NULL AND status IN ({})",
      placeholders(1, statuses.len())
    );
    let params = encode_statuses(statuses);

    let average: Option<f64> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?)
      })
      .await?;
    Ok(average)
  }
}
