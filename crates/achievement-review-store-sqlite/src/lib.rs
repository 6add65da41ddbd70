#![forbid(unsafe_code)]

//! `SQLite` implementations of the two record halves and the profile
//! directory.
//!
//! The relational and document halves are deliberately opened as separate
//! connections (and usually separate database files): nothing here may rely
//! on a transaction spanning both. The document half stores one JSON text
//! column per record, keyed by the opaque detail ref.

use std::collections::BTreeMap;
use std::path::Path;

use achievement_review_domain::{
    now_utc, rfc3339, AchievementDetail, AchievementId, AchievementReference, ActorId, Attachment,
    DetailRef, NewReference, ReviewError, Status, StatusChange, StudentId,
};
use achievement_review_store::{
    DetailStore, ProfileDirectory, ReferenceFilter, ReferenceStore, SortOrder,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use ulid::Ulid;

const REFERENCE_SCHEMA_VERSION: i64 = 1;
const DETAIL_SCHEMA_VERSION: i64 = 1;
const DIRECTORY_SCHEMA_VERSION: i64 = 1;

const REFERENCE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS achievement_references (
  id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL,
  detail_ref TEXT NOT NULL UNIQUE,
  status TEXT NOT NULL CHECK (status IN ('draft','submitted','verified','rejected','deleted')),
  rejection_note TEXT,
  verified_by TEXT,
  created_at TEXT NOT NULL,
  submitted_at TEXT,
  verified_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_references_student_created
  ON achievement_references(student_id, created_at);
CREATE INDEX IF NOT EXISTS idx_references_status
  ON achievement_references(status);
";

const DETAIL_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS achievement_details (
  detail_ref TEXT PRIMARY KEY,
  document_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

const DIRECTORY_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS student_profiles (
  actor_id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS advisee_links (
  advisor_id TEXT NOT NULL,
  student_id TEXT NOT NULL,
  PRIMARY KEY (advisor_id, student_id)
);
";

fn open_connection(path: &Path) -> Result<Connection, ReviewError> {
    let conn = Connection::open(path)
        .map_err(|err| io_err(&format!("failed to open sqlite database at {}", path.display()), &err))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|err| io_err("failed to configure sqlite pragmas", &err))?;

    Ok(conn)
}

fn record_migration(conn: &Connection, version: i64) -> Result<(), ReviewError> {
    let now = rfc3339(now_utc())?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .map_err(|err| io_err("failed to record migration", &err))?;
    Ok(())
}

fn io_err(context: &str, err: &dyn std::fmt::Display) -> ReviewError {
    ReviewError::Io(format!("{context}: {err}"))
}

/// Relational half. Owns the authoritative row per achievement and the
/// conditional status writes the whole coordinator leans on.
pub struct SqliteReferenceStore {
    conn: Connection,
}

impl SqliteReferenceStore {
    /// Opens or creates the reference database and configures pragmas.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when opening or configuring fails.
    pub fn open(path: &Path) -> Result<Self, ReviewError> {
        Ok(Self {
            conn: open_connection(path)?,
        })
    }

    /// Applies the reference schema.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when schema application fails.
    pub fn migrate(&self) -> Result<(), ReviewError> {
        self.conn
            .execute_batch(REFERENCE_SCHEMA)
            .map_err(|err| io_err("failed to apply reference schema", &err))?;
        record_migration(&self.conn, REFERENCE_SCHEMA_VERSION)
    }

    fn current_status(&self, id: AchievementId) -> Result<Option<Status>, ReviewError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM achievement_references WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| io_err("failed to read reference status", &err))?;

        raw.map(|value| {
            Status::parse(&value)
                .ok_or_else(|| ReviewError::Io(format!("corrupt reference status: {value}")))
        })
        .transpose()
    }

    /// Shared zero-rows-affected handling for every conditional write.
    fn conditional_write_miss(
        &self,
        id: AchievementId,
        expected: Status,
    ) -> Result<(), ReviewError> {
        match self.current_status(id)? {
            Some(actual) => Err(ReviewError::Conflict { expected, actual }),
            None => Err(ReviewError::NotFound(format!("achievement {id} not found"))),
        }
    }
}

impl ReferenceStore for SqliteReferenceStore {
    fn create(&self, reference: &NewReference) -> Result<AchievementId, ReviewError> {
        let id = AchievementId::new();
        self.conn
            .execute(
                "INSERT INTO achievement_references(
                    id, student_id, detail_ref, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    reference.student_id.to_string(),
                    reference.detail_ref.to_string(),
                    Status::Draft.as_str(),
                    rfc3339(reference.created_at)?,
                ],
            )
            .map_err(|err| io_err("failed to insert achievement reference", &err))?;
        Ok(id)
    }

    fn get(&self, id: AchievementId) -> Result<AchievementReference, ReviewError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, student_id, detail_ref, status, rejection_note,
                        verified_by, created_at, submitted_at, verified_at
                 FROM achievement_references
                 WHERE id = ?1 AND status <> 'deleted'",
            )
            .map_err(|err| io_err("failed to prepare reference query", &err))?;

        let mut rows = stmt
            .query(params![id.to_string()])
            .map_err(|err| io_err("failed to query reference", &err))?;

        match rows
            .next()
            .map_err(|err| io_err("failed to read reference row", &err))?
        {
            Some(row) => read_reference(row),
            None => Err(ReviewError::NotFound(format!("achievement {id} not found"))),
        }
    }

    fn list_filtered(
        &self,
        filter: &ReferenceFilter,
        sort: SortOrder,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<AchievementReference>, u64), ReviewError> {
        // An explicitly empty id/status set can match nothing; avoid the
        // degenerate `IN ()` SQL entirely.
        if matches!(&filter.students, Some(students) if students.is_empty())
            || matches!(&filter.statuses, Some(statuses) if statuses.is_empty())
        {
            return Ok((Vec::new(), 0));
        }

        let mut clauses = vec!["status <> 'deleted'".to_string()];
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(student) = filter.student {
            args.push(SqlValue::Text(student.to_string()));
            clauses.push(format!("student_id = ?{}", args.len()));
        }

        if let Some(students) = &filter.students {
            let mut placeholders = Vec::with_capacity(students.len());
            for student in students {
                args.push(SqlValue::Text(student.to_string()));
                placeholders.push(format!("?{}", args.len()));
            }
            clauses.push(format!("student_id IN ({})", placeholders.join(", ")));
        }

        if let Some(statuses) = &filter.statuses {
            let mut placeholders = Vec::with_capacity(statuses.len());
            for status in statuses {
                args.push(SqlValue::Text(status.as_str().to_string()));
                placeholders.push(format!("?{}", args.len()));
            }
            clauses.push(format!("status IN ({})", placeholders.join(", ")));
        }

        let where_clause = clauses.join(" AND ");

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM achievement_references WHERE {where_clause}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )
            .map_err(|err| io_err("failed to count references", &err))?;

        let order_clause = match sort {
            SortOrder::NewestFirst => "ORDER BY created_at DESC, id ASC",
            SortOrder::OldestFirst => "ORDER BY created_at ASC, id ASC",
        };

        args.push(SqlValue::Integer(i64::from(limit)));
        let limit_index = args.len();
        let offset_value = i64::try_from(offset)
            .map_err(|_| ReviewError::Validation("page offset too large".to_string()))?;
        args.push(SqlValue::Integer(offset_value));
        let offset_index = args.len();

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT id, student_id, detail_ref, status, rejection_note,
                        verified_by, created_at, submitted_at, verified_at
                 FROM achievement_references
                 WHERE {where_clause}
                 {order_clause}
                 LIMIT ?{limit_index} OFFSET ?{offset_index}"
            ))
            .map_err(|err| io_err("failed to prepare reference listing", &err))?;

        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|err| io_err("failed to query references", &err))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|err| io_err("failed to read reference row", &err))?
        {
            out.push(read_reference(row)?);
        }

        let total = u64::try_from(total)
            .map_err(|_| ReviewError::Io("negative reference count".to_string()))?;
        Ok((out, total))
    }

    fn update_status(
        &self,
        id: AchievementId,
        expected: Status,
        change: &StatusChange,
    ) -> Result<(), ReviewError> {
        // Bind order everywhere: id, expected, then the stamped fields.
        let affected = match change {
            StatusChange::Submitted { at } => self
                .conn
                .execute(
                    "UPDATE achievement_references
                     SET status = 'submitted', submitted_at = ?3
                     WHERE id = ?1 AND status = ?2",
                    params![id.to_string(), expected.as_str(), rfc3339(*at)?],
                )
                .map_err(|err| io_err("failed to submit reference", &err))?,
            StatusChange::Verified { at, by } => self
                .conn
                .execute(
                    "UPDATE achievement_references
                     SET status = 'verified', verified_at = ?3, verified_by = ?4,
                         rejection_note = NULL
                     WHERE id = ?1 AND status = ?2",
                    params![
                        id.to_string(),
                        expected.as_str(),
                        rfc3339(*at)?,
                        by.to_string(),
                    ],
                )
                .map_err(|err| io_err("failed to verify reference", &err))?,
            StatusChange::Rejected { at, by, note } => self
                .conn
                .execute(
                    "UPDATE achievement_references
                     SET status = 'rejected', verified_at = ?3, verified_by = ?4,
                         rejection_note = ?5
                     WHERE id = ?1 AND status = ?2",
                    params![
                        id.to_string(),
                        expected.as_str(),
                        rfc3339(*at)?,
                        by.to_string(),
                        note,
                    ],
                )
                .map_err(|err| io_err("failed to reject reference", &err))?,
        };

        if affected == 1 {
            return Ok(());
        }
        self.conditional_write_miss(id, expected)
    }

    fn soft_delete(&self, id: AchievementId, expected: Status) -> Result<(), ReviewError> {
        let affected = self
            .conn
            .execute(
                "UPDATE achievement_references
                 SET status = 'deleted'
                 WHERE id = ?1 AND status = ?2",
                params![id.to_string(), expected.as_str()],
            )
            .map_err(|err| io_err("failed to soft-delete reference", &err))?;

        if affected == 1 {
            return Ok(());
        }
        self.conditional_write_miss(id, expected)
    }
}

fn read_reference(row: &rusqlite::Row<'_>) -> Result<AchievementReference, ReviewError> {
    let id: String = row
        .get(0)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let student_id: String = row
        .get(1)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let detail_ref: String = row
        .get(2)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let status: String = row
        .get(3)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let rejection_note: Option<String> = row
        .get(4)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let verified_by: Option<String> = row
        .get(5)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let created_at: String = row
        .get(6)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let submitted_at: Option<String> = row
        .get(7)
        .map_err(|err| io_err("failed to read reference column", &err))?;
    let verified_at: Option<String> = row
        .get(8)
        .map_err(|err| io_err("failed to read reference column", &err))?;

    Ok(AchievementReference {
        id: AchievementId::parse(&id)
            .map_err(|err| ReviewError::Io(format!("corrupt reference id: {err}")))?,
        student_id: StudentId::parse(&student_id)
            .map_err(|err| ReviewError::Io(format!("corrupt reference owner: {err}")))?,
        detail_ref: DetailRef(detail_ref),
        status: Status::parse(&status)
            .ok_or_else(|| ReviewError::Io(format!("corrupt reference status: {status}")))?,
        rejection_note,
        verified_by: verified_by
            .map(|value| {
                ActorId::parse(&value)
                    .map_err(|err| ReviewError::Io(format!("corrupt verifier id: {err}")))
            })
            .transpose()?,
        created_at: achievement_review_domain::parse_rfc3339(&created_at)
            .map_err(|err| ReviewError::Io(format!("corrupt created_at: {err}")))?,
        submitted_at: submitted_at
            .map(|value| achievement_review_domain::parse_rfc3339(&value))
            .transpose()
            .map_err(|err| ReviewError::Io(format!("corrupt submitted_at: {err}")))?,
        verified_at: verified_at
            .map(|value| achievement_review_domain::parse_rfc3339(&value))
            .transpose()
            .map_err(|err| ReviewError::Io(format!("corrupt verified_at: {err}")))?,
    })
}

/// Document half. One JSON document per detail ref.
pub struct SqliteDetailStore {
    conn: Connection,
}

impl SqliteDetailStore {
    /// Opens or creates the detail database and configures pragmas.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when opening or configuring fails.
    pub fn open(path: &Path) -> Result<Self, ReviewError> {
        Ok(Self {
            conn: open_connection(path)?,
        })
    }

    /// Applies the detail schema.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when schema application fails.
    pub fn migrate(&self) -> Result<(), ReviewError> {
        self.conn
            .execute_batch(DETAIL_SCHEMA)
            .map_err(|err| io_err("failed to apply detail schema", &err))?;
        record_migration(&self.conn, DETAIL_SCHEMA_VERSION)
    }

    fn get_optional(
        &self,
        detail_ref: &DetailRef,
    ) -> Result<Option<AchievementDetail>, ReviewError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT document_json FROM achievement_details WHERE detail_ref = ?1",
                params![detail_ref.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| io_err("failed to query detail document", &err))?;

        raw.map(|document| {
            serde_json::from_str(&document)
                .map_err(|err| ReviewError::Io(format!("corrupt detail document: {err}")))
        })
        .transpose()
    }
}

impl DetailStore for SqliteDetailStore {
    fn insert(&self, detail: &AchievementDetail) -> Result<DetailRef, ReviewError> {
        let detail_ref = DetailRef(Ulid::new().to_string());
        let document = serde_json::to_string(detail)
            .map_err(|err| io_err("failed to encode detail document", &err))?;
        let now = rfc3339(now_utc())?;

        self.conn
            .execute(
                "INSERT INTO achievement_details(detail_ref, document_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![detail_ref.to_string(), document, now, now],
            )
            .map_err(|err| io_err("failed to insert detail document", &err))?;
        Ok(detail_ref)
    }

    fn get(&self, detail_ref: &DetailRef) -> Result<AchievementDetail, ReviewError> {
        self.get_optional(detail_ref)?
            .ok_or_else(|| ReviewError::NotFound(format!("detail {detail_ref} not found")))
    }

    fn get_many(
        &self,
        detail_refs: &[DetailRef],
    ) -> Result<BTreeMap<DetailRef, AchievementDetail>, ReviewError> {
        let mut out = BTreeMap::new();
        for detail_ref in detail_refs {
            if let Some(detail) = self.get_optional(detail_ref)? {
                out.insert(detail_ref.clone(), detail);
            }
        }
        Ok(out)
    }

    fn update(&self, detail_ref: &DetailRef, detail: &AchievementDetail) -> Result<(), ReviewError> {
        let document = serde_json::to_string(detail)
            .map_err(|err| io_err("failed to encode detail document", &err))?;

        let affected = self
            .conn
            .execute(
                "UPDATE achievement_details
                 SET document_json = ?2, updated_at = ?3
                 WHERE detail_ref = ?1",
                params![detail_ref.to_string(), document, rfc3339(now_utc())?],
            )
            .map_err(|err| io_err("failed to update detail document", &err))?;

        if affected == 0 {
            return Err(ReviewError::NotFound(format!(
                "detail {detail_ref} not found"
            )));
        }
        Ok(())
    }

    fn delete(&self, detail_ref: &DetailRef) -> Result<(), ReviewError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM achievement_details WHERE detail_ref = ?1",
                params![detail_ref.to_string()],
            )
            .map_err(|err| io_err("failed to delete detail document", &err))?;

        if affected == 0 {
            return Err(ReviewError::NotFound(format!(
                "detail {detail_ref} not found"
            )));
        }
        Ok(())
    }

    fn append_attachment(
        &self,
        detail_ref: &DetailRef,
        attachment: &Attachment,
    ) -> Result<(), ReviewError> {
        // Read-modify-write; attachment appends only happen in the draft
        // phase where the owning student is the sole writer.
        let mut detail = self.get(detail_ref)?;
        detail.attachments.push(attachment.clone());
        self.update(detail_ref, &detail)
    }
}

/// Profile directory backed by the relational database. Stands in for the
/// identity layer's student/advisor resolution queries.
pub struct SqliteProfileDirectory {
    conn: Connection,
}

impl SqliteProfileDirectory {
    /// Opens or creates the directory database and configures pragmas.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when opening or configuring fails.
    pub fn open(path: &Path) -> Result<Self, ReviewError> {
        Ok(Self {
            conn: open_connection(path)?,
        })
    }

    /// Applies the directory schema.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when schema application fails.
    pub fn migrate(&self) -> Result<(), ReviewError> {
        self.conn
            .execute_batch(DIRECTORY_SCHEMA)
            .map_err(|err| io_err("failed to apply directory schema", &err))?;
        record_migration(&self.conn, DIRECTORY_SCHEMA_VERSION)
    }

    /// Registers (or re-registers) an actor's student profile.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when the write fails.
    pub fn register_student(&self, actor: ActorId, student: StudentId) -> Result<(), ReviewError> {
        self.conn
            .execute(
                "INSERT INTO student_profiles(actor_id, student_id) VALUES (?1, ?2)
                 ON CONFLICT(actor_id) DO UPDATE SET student_id = excluded.student_id",
                params![actor.to_string(), student.to_string()],
            )
            .map_err(|err| io_err("failed to register student profile", &err))?;
        Ok(())
    }

    /// Records that `student` is supervised by `advisor`.
    ///
    /// # Errors
    /// Returns [`ReviewError::Io`] when the write fails.
    pub fn link_advisee(&self, advisor: ActorId, student: StudentId) -> Result<(), ReviewError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO advisee_links(advisor_id, student_id) VALUES (?1, ?2)",
                params![advisor.to_string(), student.to_string()],
            )
            .map_err(|err| io_err("failed to link advisee", &err))?;
        Ok(())
    }
}

impl ProfileDirectory for SqliteProfileDirectory {
    fn student_for_actor(&self, actor: ActorId) -> Result<Option<StudentId>, ReviewError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT student_id FROM student_profiles WHERE actor_id = ?1",
                params![actor.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| io_err("failed to resolve student profile", &err))?;

        raw.map(|value| {
            StudentId::parse(&value)
                .map_err(|err| ReviewError::Io(format!("corrupt student profile: {err}")))
        })
        .transpose()
    }

    fn advisees_of(&self, advisor: ActorId) -> Result<Vec<StudentId>, ReviewError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT student_id FROM advisee_links
                 WHERE advisor_id = ?1
                 ORDER BY student_id ASC",
            )
            .map_err(|err| io_err("failed to prepare advisee query", &err))?;

        let mut rows = stmt
            .query(params![advisor.to_string()])
            .map_err(|err| io_err("failed to query advisees", &err))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|err| io_err("failed to read advisee row", &err))?
        {
            let raw: String = row
                .get(0)
                .map_err(|err| io_err("failed to read advisee column", &err))?;
            out.push(
                StudentId::parse(&raw)
                    .map_err(|err| ReviewError::Io(format!("corrupt advisee link: {err}")))?,
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use achievement_review_domain::{parse_rfc3339, DetailContent};

    fn must<T>(result: Result<T, ReviewError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn reference_store() -> SqliteReferenceStore {
        let store = must(SqliteReferenceStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn detail_store() -> SqliteDetailStore {
        let store = must(SqliteDetailStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn directory() -> SqliteProfileDirectory {
        let dir = must(SqliteProfileDirectory::open(Path::new(":memory:")));
        must(dir.migrate());
        dir
    }

    fn utc(value: &str) -> achievement_review_domain::DateTimeUtc {
        must(parse_rfc3339(value))
    }

    fn new_reference(student: StudentId, created_at: &str) -> NewReference {
        NewReference {
            student_id: student,
            detail_ref: DetailRef(Ulid::new().to_string()),
            created_at: utc(created_at),
        }
    }

    fn fixture_detail(title: &str) -> AchievementDetail {
        DetailContent {
            title: title.to_string(),
            achievement_type: "competition".to_string(),
            ..DetailContent::default()
        }
        .into_detail()
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = reference_store();
        let student = StudentId::new();
        let id = must(store.create(&new_reference(student, "2026-03-01T09:00:00Z")));

        let reference = must(store.get(id));
        assert_eq!(reference.id, id);
        assert_eq!(reference.student_id, student);
        assert_eq!(reference.status, Status::Draft);
        assert_eq!(reference.rejection_note, None);
        assert_eq!(reference.submitted_at, None);
        assert_eq!(reference.verified_at, None);
    }

    #[test]
    fn get_unknown_reference_is_not_found() {
        let store = reference_store();
        assert!(matches!(
            store.get(AchievementId::new()),
            Err(ReviewError::NotFound(_))
        ));
    }

    #[test]
    fn soft_deleted_reference_reads_as_absent() {
        let store = reference_store();
        let id = must(store.create(&new_reference(StudentId::new(), "2026-03-01T09:00:00Z")));

        must(store.soft_delete(id, Status::Draft));
        assert!(matches!(store.get(id), Err(ReviewError::NotFound(_))));

        // The row still exists physically; a second conditional delete sees
        // the current status instead of NotFound.
        assert_eq!(
            store.soft_delete(id, Status::Draft),
            Err(ReviewError::Conflict {
                expected: Status::Draft,
                actual: Status::Deleted,
            })
        );
    }

    #[test]
    fn conditional_submit_loses_exactly_once() {
        let store = reference_store();
        let id = must(store.create(&new_reference(StudentId::new(), "2026-03-01T09:00:00Z")));

        let change = StatusChange::Submitted {
            at: utc("2026-03-02T10:00:00Z"),
        };
        must(store.update_status(id, Status::Draft, &change));

        // Loser of the race observes the real current status.
        assert_eq!(
            store.update_status(id, Status::Draft, &change),
            Err(ReviewError::Conflict {
                expected: Status::Draft,
                actual: Status::Submitted,
            })
        );

        let reference = must(store.get(id));
        assert_eq!(reference.status, Status::Submitted);
        assert_eq!(reference.submitted_at, Some(utc("2026-03-02T10:00:00Z")));
    }

    #[test]
    fn update_status_on_missing_row_is_not_found() {
        let store = reference_store();
        let change = StatusChange::Submitted {
            at: utc("2026-03-02T10:00:00Z"),
        };
        assert!(matches!(
            store.update_status(AchievementId::new(), Status::Draft, &change),
            Err(ReviewError::NotFound(_))
        ));
    }

    #[test]
    fn verify_clears_stale_rejection_note() {
        let store = reference_store();
        let id = must(store.create(&new_reference(StudentId::new(), "2026-03-01T09:00:00Z")));
        must(store.update_status(
            id,
            Status::Draft,
            &StatusChange::Submitted {
                at: utc("2026-03-02T10:00:00Z"),
            },
        ));

        let reviewer = ActorId::new();
        must(store.update_status(
            id,
            Status::Submitted,
            &StatusChange::Verified {
                at: utc("2026-03-03T11:00:00Z"),
                by: reviewer,
            },
        ));

        let reference = must(store.get(id));
        assert_eq!(reference.status, Status::Verified);
        assert_eq!(reference.verified_by, Some(reviewer));
        assert_eq!(reference.verified_at, Some(utc("2026-03-03T11:00:00Z")));
        assert_eq!(reference.rejection_note, None);
    }

    #[test]
    fn reject_stores_the_note() {
        let store = reference_store();
        let id = must(store.create(&new_reference(StudentId::new(), "2026-03-01T09:00:00Z")));
        must(store.update_status(
            id,
            Status::Draft,
            &StatusChange::Submitted {
                at: utc("2026-03-02T10:00:00Z"),
            },
        ));

        must(store.update_status(
            id,
            Status::Submitted,
            &StatusChange::Rejected {
                at: utc("2026-03-03T11:00:00Z"),
                by: ActorId::new(),
                note: "certificate unreadable".to_string(),
            },
        ));

        let reference = must(store.get(id));
        assert_eq!(reference.status, Status::Rejected);
        assert_eq!(
            reference.rejection_note,
            Some("certificate unreadable".to_string())
        );
    }

    #[test]
    fn listing_filters_by_owner_and_status() {
        let store = reference_store();
        let alice = StudentId::new();
        let bob = StudentId::new();

        let a1 = must(store.create(&new_reference(alice, "2026-03-01T09:00:00Z")));
        let a2 = must(store.create(&new_reference(alice, "2026-03-02T09:00:00Z")));
        let _b1 = must(store.create(&new_reference(bob, "2026-03-03T09:00:00Z")));

        must(store.update_status(
            a2,
            Status::Draft,
            &StatusChange::Submitted {
                at: utc("2026-03-04T09:00:00Z"),
            },
        ));

        let filter = ReferenceFilter {
            student: Some(alice),
            ..ReferenceFilter::default()
        };
        let (rows, total) = must(store.list_filtered(&filter, SortOrder::NewestFirst, 10, 0));
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a2);
        assert_eq!(rows[1].id, a1);

        let filter = ReferenceFilter {
            student: Some(alice),
            statuses: Some(vec![Status::Submitted]),
            ..ReferenceFilter::default()
        };
        let (rows, total) = must(store.list_filtered(&filter, SortOrder::NewestFirst, 10, 0));
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, a2);
    }

    #[test]
    fn listing_filters_by_student_set() {
        let store = reference_store();
        let alice = StudentId::new();
        let bob = StudentId::new();
        let carol = StudentId::new();

        must(store.create(&new_reference(alice, "2026-03-01T09:00:00Z")));
        must(store.create(&new_reference(bob, "2026-03-02T09:00:00Z")));
        must(store.create(&new_reference(carol, "2026-03-03T09:00:00Z")));

        let filter = ReferenceFilter {
            students: Some(vec![alice, bob]),
            ..ReferenceFilter::default()
        };
        let (rows, total) = must(store.list_filtered(&filter, SortOrder::OldestFirst, 10, 0));
        assert_eq!(total, 2);
        assert_eq!(rows[0].student_id, alice);
        assert_eq!(rows[1].student_id, bob);

        let filter = ReferenceFilter {
            students: Some(Vec::new()),
            ..ReferenceFilter::default()
        };
        let (rows, total) = must(store.list_filtered(&filter, SortOrder::NewestFirst, 10, 0));
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn listing_breaks_created_at_ties_by_id() {
        let store = reference_store();
        let student = StudentId::new();
        let first = must(store.create(&new_reference(student, "2026-03-01T09:00:00Z")));
        let second = must(store.create(&new_reference(student, "2026-03-01T09:00:00Z")));

        let (lower, higher) = if first < second {
            (first, second)
        } else {
            (second, first)
        };

        let filter = ReferenceFilter::default();
        let (rows, _) = must(store.list_filtered(&filter, SortOrder::NewestFirst, 10, 0));
        assert_eq!(rows[0].id, lower);
        assert_eq!(rows[1].id, higher);

        let (rows, _) = must(store.list_filtered(&filter, SortOrder::OldestFirst, 10, 0));
        assert_eq!(rows[0].id, lower);
        assert_eq!(rows[1].id, higher);
    }

    #[test]
    fn listing_pages_with_offset_and_total() {
        let store = reference_store();
        let student = StudentId::new();
        for day in 1..=5 {
            must(store.create(&new_reference(
                student,
                &format!("2026-03-0{day}T09:00:00Z"),
            )));
        }

        let filter = ReferenceFilter::default();
        let (page_one, total) = must(store.list_filtered(&filter, SortOrder::NewestFirst, 2, 0));
        assert_eq!(total, 5);
        assert_eq!(page_one.len(), 2);

        let (page_three, total) = must(store.list_filtered(&filter, SortOrder::NewestFirst, 2, 4));
        assert_eq!(total, 5);
        assert_eq!(page_three.len(), 1);
    }

    #[test]
    fn detail_round_trip_preserves_document() {
        let store = detail_store();
        let detail = fixture_detail("Provincial Hackathon Winner");
        let detail_ref = must(store.insert(&detail));

        let loaded = must(store.get(&detail_ref));
        assert_eq!(loaded, detail);
    }

    #[test]
    fn get_many_omits_missing_entries() {
        let store = detail_store();
        let kept = must(store.insert(&fixture_detail("kept")));
        let missing = DetailRef(Ulid::new().to_string());

        let out = must(store.get_many(&[kept.clone(), missing.clone()]));
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&kept));
        assert!(!out.contains_key(&missing));
    }

    #[test]
    fn update_missing_detail_is_not_found() {
        let store = detail_store();
        let detail = fixture_detail("anything");
        assert!(matches!(
            store.update(&DetailRef(Ulid::new().to_string()), &detail),
            Err(ReviewError::NotFound(_))
        ));
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let store = detail_store();
        let detail_ref = must(store.insert(&fixture_detail("gone")));
        must(store.delete(&detail_ref));
        assert!(matches!(
            store.get(&detail_ref),
            Err(ReviewError::NotFound(_))
        ));
    }

    #[test]
    fn attachments_append_in_order() {
        let store = detail_store();
        let detail_ref = must(store.insert(&fixture_detail("with files")));

        for name in ["first.pdf", "second.pdf"] {
            must(store.append_attachment(
                &detail_ref,
                &Attachment {
                    file_name: name.to_string(),
                    file_url: format!("/uploads/{name}"),
                    file_type: "application/pdf".to_string(),
                    uploaded_at: utc("2026-03-01T09:00:00Z"),
                },
            ));
        }

        let loaded = must(store.get(&detail_ref));
        assert_eq!(loaded.attachments.len(), 2);
        assert_eq!(loaded.attachments[0].file_name, "first.pdf");
        assert_eq!(loaded.attachments[1].file_name, "second.pdf");
    }

    #[test]
    fn directory_resolves_students_and_advisees() {
        let dir = directory();
        let actor = ActorId::new();
        let student = StudentId::new();
        must(dir.register_student(actor, student));

        assert_eq!(must(dir.student_for_actor(actor)), Some(student));
        assert_eq!(must(dir.student_for_actor(ActorId::new())), None);

        let advisor = ActorId::new();
        let other = StudentId::new();
        must(dir.link_advisee(advisor, student));
        must(dir.link_advisee(advisor, other));
        must(dir.link_advisee(advisor, other));

        let advisees = must(dir.advisees_of(advisor));
        assert_eq!(advisees.len(), 2);
        assert!(advisees.contains(&student));
        assert!(advisees.contains(&other));

        assert!(must(dir.advisees_of(ActorId::new())).is_empty());
    }
}
