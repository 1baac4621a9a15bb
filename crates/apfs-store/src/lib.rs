//! SQLite-backed upsert store for forecast records.
//!
//! One table, `data`, keyed by the external record id. Writes are
//! replace-on-id: a batch apply fully overwrites any row whose id reappears
//! in a later fetch. The table is the single source of truth for the
//! dashboard; there is no cache between the store and its readers.

use std::str::FromStr;

use apfs_core::ForecastRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, QueryBuilder, Row};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "apfs-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening store: {0}")]
    Open(#[source] sqlx::Error),
    #[error("schema setup failed: {0}")]
    Schema(#[source] sqlx::Error),
    #[error("batch write failed: {0}")]
    Write(#[source] sqlx::Error),
    #[error("read query failed: {0}")]
    Read(#[source] sqlx::Error),
}

/// Failure of an ad-hoc read query. Rendered as a string in the dashboard
/// rather than propagated, so an invalid generated or hand-entered query
/// never takes the session down.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("only a single SELECT statement is allowed")]
    NotASelect,
    #[error("{0}")]
    Execution(String),
}

/// Parameterized filter predicates for the dashboard's record table.
/// Every user-influenced value is bound, never interpolated.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Substring match against `requirements_title`.
    pub title: Option<String>,
    /// Exact match against `small_business_program`.
    pub program: Option<String>,
    /// Substring match against `place_of_performance_state`.
    pub state: Option<String>,
    /// Substring match against `naics`.
    pub naics: Option<String>,
    /// Exact match against the `dollar_range` bucket.
    pub dollar_range: Option<String>,
}

/// Column-ordered result of an ad-hoc SELECT, with values rendered for
/// display.
#[derive(Debug, Clone, Default)]
pub struct QueryResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column order of the `data` table; shared with the chat layer's schema
/// prompt so generated queries name real columns.
pub const SCHEMA_COLUMNS: &[&str] = &[
    "id",
    "organization",
    "small_business_program",
    "dollar_range",
    "contract_vehicle",
    "competitive",
    "award_quarter",
    "estimated_release_date",
    "publish_date",
    "naics",
    "contract_type",
    "apfs_number",
    "requirements_title",
    "requirement",
    "contract_status",
    "estimated_period_of_performance_start",
    "estimated_period_of_performance_end",
    "anticipated_award_date",
    "place_of_performance_city",
    "place_of_performance_state",
    "requirements_contact_first_name",
    "requirements_contact_last_name",
    "requirements_contact_email",
    "alternate_contact_first_name",
    "alternate_contact_last_name",
    "alternate_contact_phone",
    "alternate_contact_email",
    "fiscal_year",
    "created_on",
    "requirements_office",
    "contracting_office",
    "apfs_coordinator_office",
    "current_state",
    "last_updated_date",
    "published_date",
    "previous_published_date",
];

#[derive(Debug, Clone)]
pub struct ForecastStore {
    pool: SqlitePool,
}

impl ForecastStore {
    /// Open (and create if missing) the database at `database_url`,
    /// e.g. `sqlite:data.db`.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::Open)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;
        Ok(Self { pool })
    }

    /// In-memory store sharing one connection, used by tests and demos.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Open)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;
        Ok(Self { pool })
    }

    /// Release the underlying pool. Each ingestion run opens, uses, and
    /// closes its own store handle; nothing holds a process-wide connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Create the `data` table if absent. Idempotent, called on every run;
    /// there is no migration versioning.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data (
                id INTEGER PRIMARY KEY,
                organization TEXT,
                small_business_program TEXT,
                dollar_range TEXT,
                contract_vehicle TEXT,
                competitive TEXT,
                award_quarter TEXT,
                estimated_release_date TEXT,
                publish_date TEXT,
                naics TEXT,
                contract_type TEXT,
                apfs_number TEXT,
                requirements_title TEXT,
                requirement TEXT,
                contract_status TEXT,
                estimated_period_of_performance_start TEXT,
                estimated_period_of_performance_end TEXT,
                anticipated_award_date TEXT,
                place_of_performance_city TEXT,
                place_of_performance_state TEXT,
                requirements_contact_first_name TEXT,
                requirements_contact_last_name TEXT,
                requirements_contact_email TEXT,
                alternate_contact_first_name TEXT,
                alternate_contact_last_name TEXT,
                alternate_contact_phone TEXT,
                alternate_contact_email TEXT,
                fiscal_year INTEGER,
                created_on TEXT,
                requirements_office TEXT,
                contracting_office TEXT,
                apfs_coordinator_office TEXT,
                current_state TEXT,
                last_updated_date TEXT,
                published_date TEXT,
                previous_published_date TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Schema)?;
        Ok(())
    }

    /// Apply one fetched batch: an atomic `INSERT OR REPLACE` per record,
    /// all inside a single transaction committed after the last row. A
    /// failure partway through rolls the whole batch back; re-running the
    /// feed pull is always safe.
    pub async fn apply(&self, records: &[ForecastRecord]) -> Result<usize, StoreError> {
        let placeholders = vec!["?"; SCHEMA_COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO data ({}) VALUES ({})",
            SCHEMA_COLUMNS.join(", "),
            placeholders
        );

        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;

        for record in records {
            sqlx::query(&sql)
                .bind(record.id)
                .bind(&record.organization)
                .bind(&record.small_business_program)
                .bind(&record.dollar_range)
                .bind(&record.contract_vehicle)
                .bind(&record.competitive)
                .bind(&record.award_quarter)
                .bind(&record.estimated_release_date)
                .bind(&record.publish_date)
                .bind(&record.naics)
                .bind(&record.contract_type)
                .bind(&record.apfs_number)
                .bind(&record.requirements_title)
                .bind(&record.requirement)
                .bind(&record.contract_status)
                .bind(&record.estimated_period_of_performance_start)
                .bind(&record.estimated_period_of_performance_end)
                .bind(&record.anticipated_award_date)
                .bind(&record.place_of_performance_city)
                .bind(&record.place_of_performance_state)
                .bind(&record.requirements_contact_first_name)
                .bind(&record.requirements_contact_last_name)
                .bind(&record.requirements_contact_email)
                .bind(&record.alternate_contact_first_name)
                .bind(&record.alternate_contact_last_name)
                .bind(&record.alternate_contact_phone)
                .bind(&record.alternate_contact_email)
                .bind(record.fiscal_year)
                .bind(&record.created_on)
                .bind(&record.requirements_office)
                .bind(&record.contracting_office)
                .bind(&record.apfs_coordinator_office)
                .bind(&record.current_state)
                .bind(&record.last_updated_date)
                .bind(&record.published_date)
                .bind(&record.previous_published_date)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Write)?;
        }

        tx.commit().await.map_err(StoreError::Write)?;
        debug!(rows = records.len(), "batch applied");
        Ok(records.len())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM data")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        row.try_get("n").map_err(StoreError::Read)
    }

    pub async fn get(&self, id: i64) -> Result<Option<ForecastRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM data WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        row.map(|r| record_from_row(&r))
            .transpose()
            .map_err(StoreError::Read)
    }

    /// Filtered record listing for the dashboard. Predicates are appended
    /// with bound parameters only.
    pub async fn search(
        &self,
        filter: &RecordFilter,
        limit: i64,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM data WHERE 1=1");

        if let Some(title) = &filter.title {
            qb.push(" AND requirements_title LIKE ");
            qb.push_bind(format!("%{title}%"));
        }
        if let Some(program) = &filter.program {
            qb.push(" AND small_business_program = ");
            qb.push_bind(program.clone());
        }
        if let Some(state) = &filter.state {
            qb.push(" AND place_of_performance_state LIKE ");
            qb.push_bind(format!("%{state}%"));
        }
        if let Some(naics) = &filter.naics {
            qb.push(" AND naics LIKE ");
            qb.push_bind(format!("%{naics}%"));
        }
        if let Some(dollar_range) = &filter.dollar_range {
            qb.push(" AND dollar_range = ");
            qb.push_bind(dollar_range.clone());
        }
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)
    }

    /// Records whose requirement text mentions any of the given competency
    /// terms. One bound `LIKE` predicate per term, OR-joined; an empty term
    /// list recommends nothing rather than everything.
    pub async fn recommend(
        &self,
        competencies: &[String],
        limit: i64,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let terms: Vec<&str> = competencies
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("SELECT * FROM data WHERE ");
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("requirement LIKE ");
            qb.push_bind(format!("%{term}%"));
        }
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)
    }

    /// Distinct program buckets present in the table, for the filter select.
    pub async fn distinct_programs(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_nonnull("SELECT DISTINCT small_business_program AS v FROM data WHERE small_business_program IS NOT NULL ORDER BY v")
            .await
    }

    /// Distinct dollar-range buckets present in the table.
    pub async fn distinct_dollar_ranges(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_nonnull(
            "SELECT DISTINCT dollar_range AS v FROM data WHERE dollar_range IS NOT NULL ORDER BY v",
        )
        .await
    }

    async fn distinct_nonnull(&self, sql: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        rows.iter()
            .map(|r| r.try_get("v"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)
    }

    /// Execute a model-generated or hand-entered read query. Anything other
    /// than a single SELECT is rejected up front; execution failures come
    /// back as a displayable `QueryError`, never a panic or a crashed
    /// session.
    pub async fn run_select(&self, sql: &str) -> Result<QueryResultTable, QueryError> {
        let trimmed = sql.trim().trim_end_matches(';').trim();
        let lowered = trimmed.to_ascii_lowercase();
        if !(lowered.starts_with("select") || lowered.starts_with("with")) {
            return Err(QueryError::NotASelect);
        }
        if has_unquoted_semicolon(trimmed) {
            return Err(QueryError::NotASelect);
        }

        let rows = sqlx::query(trimmed)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryError::Execution(e.to_string()))?;

        let mut table = QueryResultTable::default();
        if let Some(first) = rows.first() {
            table.columns = first
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
        }
        for row in &rows {
            let mut out = Vec::with_capacity(row.columns().len());
            for idx in 0..row.columns().len() {
                out.push(display_value(row, idx));
            }
            table.rows.push(out);
        }
        Ok(table)
    }
}

/// Statement separator scan for the SELECT-only guard. Semicolons inside
/// quoted literals are data; SQL escapes a quote by doubling it, which this
/// walk handles by toggling in and straight back out.
fn has_unquoted_semicolon(sql: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    for c in sql.chars() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => return true,
            _ => {}
        }
    }
    false
}

/// Render one column of an ad-hoc result row. SQLite columns are dynamically
/// typed, so decode is attempted in affinity order.
fn display_value(row: &SqliteRow, idx: usize) -> String {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.unwrap_or_default();
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|n| n.to_string()).unwrap_or_default();
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(|n| n.to_string()).unwrap_or_default();
    }
    String::new()
}

fn record_from_row(row: &SqliteRow) -> Result<ForecastRecord, sqlx::Error> {
    Ok(ForecastRecord {
        id: row.try_get("id")?,
        organization: row.try_get("organization")?,
        small_business_program: row.try_get("small_business_program")?,
        dollar_range: row.try_get("dollar_range")?,
        contract_vehicle: row.try_get("contract_vehicle")?,
        competitive: row.try_get("competitive")?,
        award_quarter: row.try_get("award_quarter")?,
        estimated_release_date: row.try_get("estimated_release_date")?,
        publish_date: row.try_get("publish_date")?,
        naics: row.try_get("naics")?,
        contract_type: row.try_get("contract_type")?,
        apfs_number: row.try_get("apfs_number")?,
        requirements_title: row.try_get("requirements_title")?,
        requirement: row.try_get("requirement")?,
        contract_status: row.try_get("contract_status")?,
        estimated_period_of_performance_start: row
            .try_get("estimated_period_of_performance_start")?,
        estimated_period_of_performance_end: row.try_get("estimated_period_of_performance_end")?,
        anticipated_award_date: row.try_get("anticipated_award_date")?,
        place_of_performance_city: row.try_get("place_of_performance_city")?,
        place_of_performance_state: row.try_get("place_of_performance_state")?,
        requirements_contact_first_name: row.try_get("requirements_contact_first_name")?,
        requirements_contact_last_name: row.try_get("requirements_contact_last_name")?,
        requirements_contact_email: row.try_get("requirements_contact_email")?,
        alternate_contact_first_name: row.try_get("alternate_contact_first_name")?,
        alternate_contact_last_name: row.try_get("alternate_contact_last_name")?,
        alternate_contact_phone: row.try_get("alternate_contact_phone")?,
        alternate_contact_email: row.try_get("alternate_contact_email")?,
        fiscal_year: row.try_get("fiscal_year")?,
        created_on: row.try_get("created_on")?,
        requirements_office: row.try_get("requirements_office")?,
        contracting_office: row.try_get("contracting_office")?,
        apfs_coordinator_office: row.try_get("apfs_coordinator_office")?,
        current_state: row.try_get("current_state")?,
        last_updated_date: row.try_get("last_updated_date")?,
        published_date: row.try_get("published_date")?,
        previous_published_date: row.try_get("previous_published_date")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use apfs_core::RawForecastRecord;

    async fn store() -> ForecastStore {
        let store = ForecastStore::open_in_memory().await.expect("open");
        store.ensure_schema().await.expect("schema");
        store
    }

    fn record(id: i64, organization: &str) -> ForecastRecord {
        ForecastRecord {
            id,
            organization: Some(organization.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let store = store().await;
        store.ensure_schema().await.expect("second ensure_schema");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn applying_the_same_batch_twice_leaves_n_rows() {
        let store = store().await;
        let batch = vec![record(1, "DHS"), record(2, "CBP"), record(3, "TSA")];
        assert_eq!(store.apply(&batch).await.unwrap(), 3);
        assert_eq!(store.apply(&batch).await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 3);
        let one = store.get(1).await.unwrap().unwrap();
        assert_eq!(one.organization.as_deref(), Some("DHS"));
    }

    #[tokio::test]
    async fn reapplied_id_fully_overwrites_the_row() {
        let store = store().await;
        let mut first = record(7, "DHS");
        first.naics = Some("541511".into());
        store.apply(&[first]).await.unwrap();

        // Same id, different values, one field now absent.
        let second = record(7, "DHS-Renamed");
        store.apply(&[second]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let row = store.get(7).await.unwrap().unwrap();
        assert_eq!(row.organization.as_deref(), Some("DHS-Renamed"));
        assert_eq!(row.naics, None, "overwrite, not merge");
    }

    #[tokio::test]
    async fn records_with_missing_optional_fields_store_as_null() {
        let store = store().await;
        let bare = ForecastRecord {
            id: 11,
            ..Default::default()
        };
        store.apply(&[bare]).await.unwrap();
        let row = store.get(11).await.unwrap().unwrap();
        assert_eq!(row.requirements_contact_email, None);
        assert_eq!(row.fiscal_year, None);
    }

    #[tokio::test]
    async fn end_to_end_feed_element_round_trip() {
        let store = store().await;
        let raw: RawForecastRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "organization": "DHS",
            "dollar_range": {"display_name": "$0 to $250K"},
            "naics": "541511"
        }))
        .unwrap();
        store.apply(&[raw.into_record()]).await.unwrap();

        let row = store.get(1).await.unwrap().unwrap();
        assert_eq!(row.organization.as_deref(), Some("DHS"));
        assert_eq!(row.dollar_range.as_deref(), Some("$0 to $250K"));
        assert_eq!(row.naics.as_deref(), Some("541511"));
        assert_eq!(row.contract_vehicle, None);

        let renamed: RawForecastRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "organization": "DHS-Renamed",
            "dollar_range": {"display_name": "$0 to $250K"},
            "naics": "541511"
        }))
        .unwrap();
        store.apply(&[renamed.into_record()]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let row = store.get(1).await.unwrap().unwrap();
        assert_eq!(row.organization.as_deref(), Some("DHS-Renamed"));
    }

    #[tokio::test]
    async fn filters_bind_user_input_instead_of_interpolating() {
        let store = store().await;
        let mut a = record(1, "DHS");
        a.requirements_title = Some("Cloud Migration O'Brien".into());
        a.place_of_performance_state = Some("VA".into());
        a.small_business_program = Some("8(a)".into());
        let mut b = record(2, "CBP");
        b.requirements_title = Some("Fence Maintenance".into());
        b.place_of_performance_state = Some("TX".into());
        store.apply(&[a, b]).await.unwrap();

        // A single quote in the input is data, not syntax.
        let hits = store
            .search(
                &RecordFilter {
                    title: Some("O'Brien".into()),
                    ..Default::default()
                },
                100,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        let hits = store
            .search(
                &RecordFilter {
                    program: Some("8(a)".into()),
                    state: Some("V".into()),
                    ..Default::default()
                },
                100,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let none = store
            .search(
                &RecordFilter {
                    naics: Some("9999".into()),
                    ..Default::default()
                },
                100,
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn recommendations_match_requirement_text_with_bound_terms() {
        let store = store().await;
        let mut a = record(1, "DHS");
        a.requirement = Some("Cloud migration and managed hosting services".into());
        let mut b = record(2, "CBP");
        b.requirement = Some("Logistics support for field offices".into());
        let mut c = record(3, "TSA");
        c.requirement = Some("Janitorial services".into());
        store.apply(&[a, b, c]).await.unwrap();

        let hits = store
            .recommend(&["cloud migration".into(), "logistics".into()], 100)
            .await
            .unwrap();
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);

        // A quote in an extracted competency is data, not syntax.
        let hits = store
            .recommend(&["O'Hare staffing".into()], 100)
            .await
            .unwrap();
        assert!(hits.is_empty());

        // Blank terms recommend nothing rather than everything.
        let hits = store
            .recommend(&["  ".into(), String::new()], 100)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn ctes_and_quoted_semicolons_pass_the_select_guard() {
        let store = store().await;
        let mut a = record(1, "DHS");
        a.requirement = Some("data; more data".into());
        store.apply(&[a]).await.unwrap();

        let table = store
            .run_select("WITH t AS (SELECT id FROM data) SELECT * FROM t")
            .await
            .unwrap();
        assert_eq!(table.rows.len(), 1);

        let table = store
            .run_select("SELECT id FROM data WHERE requirement LIKE '%data; more%'")
            .await
            .unwrap();
        assert_eq!(table.rows.len(), 1);

        let err = store
            .run_select("WITH t AS (SELECT 1) SELECT * FROM t; DROP TABLE data")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NotASelect));
    }

    #[tokio::test]
    async fn distinct_buckets_reflect_stored_rows() {
        let store = store().await;
        let mut a = record(1, "DHS");
        a.dollar_range = Some("$0 to $250K".into());
        a.small_business_program = Some("Small Business".into());
        let mut b = record(2, "TSA");
        b.dollar_range = Some("$250K to $500K".into());
        store.apply(&[a, b]).await.unwrap();

        assert_eq!(
            store.distinct_dollar_ranges().await.unwrap(),
            vec!["$0 to $250K".to_string(), "$250K to $500K".to_string()]
        );
        assert_eq!(
            store.distinct_programs().await.unwrap(),
            vec!["Small Business".to_string()]
        );
    }

    #[tokio::test]
    async fn ad_hoc_reads_are_select_only_and_fail_soft() {
        let store = store().await;
        store.apply(&[record(1, "DHS")]).await.unwrap();

        let err = store.run_select("DROP TABLE data").await.unwrap_err();
        assert!(matches!(err, QueryError::NotASelect));

        let err = store
            .run_select("SELECT 1; DROP TABLE data")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NotASelect));

        let err = store
            .run_select("SELECT nope FROM data")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));

        let table = store
            .run_select("SELECT id, organization FROM data")
            .await
            .unwrap();
        assert_eq!(table.columns, vec!["id", "organization"]);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "DHS".to_string()]]);

        // Table untouched by the rejected statements.
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
