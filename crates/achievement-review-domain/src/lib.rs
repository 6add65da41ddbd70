#![forbid(unsafe_code)]

//! Domain types for the achievement review workflow.
//!
//! One achievement record is deliberately split across two stores: the
//! relational half ([`AchievementReference`]) owns identity, ownership and
//! status; the document half ([`AchievementDetail`]) owns the free-form
//! payload and attachments. The reference is the source of truth for
//! existence.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

pub type DateTimeUtc = OffsetDateTime;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ReviewError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid state: operation requires status {required}, record is {actual}")]
    InvalidState { required: Status, actual: Status },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: expected status {expected}, found {actual}")]
    Conflict { expected: Status, actual: Status },
    #[error("storage error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AchievementId(pub Ulid);

impl AchievementId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses an achievement id from its canonical ULID string.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] when the value is not a ULID.
    pub fn parse(value: &str) -> Result<Self, ReviewError> {
        let ulid = Ulid::from_str(value)
            .map_err(|err| ReviewError::Validation(format!("invalid achievement id: {err}")))?;
        Ok(Self(ulid))
    }
}

impl Default for AchievementId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AchievementId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StudentId(pub Ulid);

impl StudentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses a student id from its canonical ULID string.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] when the value is not a ULID.
    pub fn parse(value: &str) -> Result<Self, ReviewError> {
        let ulid = Ulid::from_str(value)
            .map_err(|err| ReviewError::Validation(format!("invalid student id: {err}")))?;
        Ok(Self(ulid))
    }
}

impl Default for StudentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for StudentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an authenticated caller. Credential validation happens in the
/// excluded transport layer; the core trusts `(ActorId, Role)` as given.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ActorId(pub Ulid);

impl ActorId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses an actor id from its canonical ULID string.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] when the value is not a ULID.
    pub fn parse(value: &str) -> Result<Self, ReviewError> {
        let ulid = Ulid::from_str(value)
            .map_err(|err| ReviewError::Validation(format!("invalid actor id: {err}")))?;
        Ok(Self(ulid))
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key into the document store. Set exactly once at creation and never
/// changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DetailRef(pub String);

impl Display for DetailRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "verified" => Some(Self::Verified),
            "rejected" => Some(Self::Rejected),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Legal moves: `draft -> submitted`, `draft -> deleted`,
    /// `submitted -> {verified, rejected}`. Everything else is refused.
    #[must_use]
    pub fn may_transition(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Submitted)
                | (Self::Draft, Self::Deleted)
                | (Self::Submitted, Self::Verified)
                | (Self::Submitted, Self::Rejected)
        )
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Advisor,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Advisor => "advisor",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Self::Student),
            "advisor" => Some(Self::Advisor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Lifecycle review actions (verify/reject) are gated on this, not on the
    /// advisee relationship.
    #[must_use]
    pub fn can_review(self) -> bool {
        matches!(self, Self::Advisor | Self::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

/// Relational half of an achievement record. Authoritative for identity,
/// ownership and status.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AchievementReference {
    pub id: AchievementId,
    pub student_id: StudentId,
    pub detail_ref: DetailRef,
    pub status: Status,
    pub rejection_note: Option<String>,
    pub verified_by: Option<ActorId>,
    pub created_at: DateTimeUtc,
    pub submitted_at: Option<DateTimeUtc>,
    pub verified_at: Option<DateTimeUtc>,
}

/// Creation payload for the relational half. The store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewReference {
    pub student_id: StudentId,
    pub detail_ref: DetailRef,
    pub created_at: DateTimeUtc,
}

/// A status transition together with the fields it stamps. Carrying the data
/// per variant keeps the conditional write colocated with exactly the columns
/// that transition is allowed to touch.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    Submitted {
        at: DateTimeUtc,
    },
    Verified {
        at: DateTimeUtc,
        by: ActorId,
    },
    Rejected {
        at: DateTimeUtc,
        by: ActorId,
        note: String,
    },
}

impl StatusChange {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Submitted { .. } => Status::Submitted,
            Self::Verified { .. } => Status::Verified,
            Self::Rejected { .. } => Status::Rejected,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompetitionDetails {
    #[serde(default)]
    pub competition_name: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub medal: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: DateTimeUtc,
}

/// Attachment tuple as delivered by the excluded upload component. The
/// coordinator stamps the server-side timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AttachmentInput {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
}

impl AttachmentInput {
    /// Checks the tuple before it is recorded.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] when the file name or URL is empty.
    pub fn validate(&self) -> Result<(), ReviewError> {
        ensure_non_empty("file_name", &self.file_name)?;
        ensure_non_empty("file_url", &self.file_url)?;
        Ok(())
    }

    #[must_use]
    pub fn stamped(self, at: DateTimeUtc) -> Attachment {
        Attachment {
            file_name: self.file_name,
            file_url: self.file_url,
            file_type: self.file_type,
            uploaded_at: at,
        }
    }
}

/// Caller-supplied descriptive content, without attachments. Attachment
/// lifecycle is owned by the coordinator so that a new document always starts
/// with an empty, present attachment list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DetailContent {
    pub title: String,
    pub achievement_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub details: CompetitionDetails,
}

impl DetailContent {
    /// Checks required fields before any store write.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] when title or type is empty.
    pub fn validate(&self) -> Result<(), ReviewError> {
        ensure_non_empty("title", &self.title)?;
        ensure_non_empty("achievement_type", &self.achievement_type)?;
        Ok(())
    }

    #[must_use]
    pub fn into_detail(self) -> AchievementDetail {
        self.into_detail_with_attachments(Vec::new())
    }

    #[must_use]
    pub fn into_detail_with_attachments(self, attachments: Vec<Attachment>) -> AchievementDetail {
        AchievementDetail {
            content: self,
            attachments,
        }
    }
}

/// Document half of an achievement record. Exactly one exists per live
/// reference; the attachment list is append-only while the reference is a
/// draft and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AchievementDetail {
    #[serde(flatten)]
    pub content: DetailContent,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreatedView {
    pub id: AchievementId,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub id: AchievementId,
    pub status: Status,
    pub rejection_note: Option<String>,
    pub details: AchievementDetail,
    pub created_at: DateTimeUtc,
}

/// One row of a merged listing: reference fields joined with the headline
/// detail fields.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: AchievementId,
    pub student_id: StudentId,
    pub status: Status,
    pub title: String,
    pub achievement_type: String,
    pub points: u32,
    pub submitted_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_data: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Created,
    Submitted,
    Verified,
    Rejected,
}

impl LifecycleEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

/// One derived lifecycle event. History is recomputed from the reference's
/// timestamps on every call; nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub at: DateTimeUtc,
    pub by: Option<ActorId>,
    pub note: Option<String>,
}

#[must_use]
pub fn now_utc() -> DateTimeUtc {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`ReviewError::Io`] when formatting fails.
pub fn rfc3339(value: DateTimeUtc) -> Result<String, ReviewError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| ReviewError::Io(format!("failed to format RFC3339 timestamp: {err}")))
}

/// Parses an RFC3339 timestamp.
///
/// # Errors
/// Returns [`ReviewError::Validation`] when parsing fails.
pub fn parse_rfc3339(value: &str) -> Result<DateTimeUtc, ReviewError> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| ReviewError::Validation(format!("invalid RFC3339 timestamp: {err}")))
}

/// Ensures a string field is non-empty after trimming.
///
/// # Errors
/// Returns [`ReviewError::Validation`] naming the offending field.
pub fn ensure_non_empty(field_name: &str, value: &str) -> Result<(), ReviewError> {
    if value.trim().is_empty() {
        return Err(ReviewError::Validation(format!(
            "{field_name} MUST be non-empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T>(result: Result<T, ReviewError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            Status::Draft,
            Status::Submitted,
            Status::Verified,
            Status::Rejected,
            Status::Deleted,
        ] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("pending"), None);
    }

    #[test]
    fn transition_matrix_is_forward_only() {
        assert!(Status::Draft.may_transition(Status::Submitted));
        assert!(Status::Draft.may_transition(Status::Deleted));
        assert!(Status::Submitted.may_transition(Status::Verified));
        assert!(Status::Submitted.may_transition(Status::Rejected));

        assert!(!Status::Draft.may_transition(Status::Verified));
        assert!(!Status::Submitted.may_transition(Status::Draft));
        assert!(!Status::Submitted.may_transition(Status::Deleted));
        assert!(!Status::Verified.may_transition(Status::Submitted));
        assert!(!Status::Rejected.may_transition(Status::Verified));
        assert!(!Status::Deleted.may_transition(Status::Draft));
    }

    #[test]
    fn content_validation_requires_title_and_type() {
        let mut content = DetailContent {
            title: "Provincial Hackathon Winner".to_string(),
            achievement_type: "competition".to_string(),
            ..DetailContent::default()
        };
        must(content.validate());

        content.title = "  ".to_string();
        assert_eq!(
            content.validate(),
            Err(ReviewError::Validation("title MUST be non-empty".to_string()))
        );
    }

    #[test]
    fn new_detail_starts_with_empty_present_attachments() {
        let detail = DetailContent {
            title: "t".to_string(),
            achievement_type: "competition".to_string(),
            ..DetailContent::default()
        }
        .into_detail();

        assert!(detail.attachments.is_empty());

        let json = match serde_json::to_value(&detail) {
            Ok(value) => value,
            Err(err) => panic!("serialization failed: {err}"),
        };
        // The list must be present-and-empty, not absent: downstream merges
        // cannot tell a missing list from a not-yet-loaded one.
        assert_eq!(json["attachments"], serde_json::json!([]));
    }

    #[test]
    fn attachment_input_is_stamped_server_side() {
        let input = AttachmentInput {
            file_name: "certificate.pdf".to_string(),
            file_url: "/uploads/certificate.pdf".to_string(),
            file_type: "application/pdf".to_string(),
        };
        must(input.validate());

        let at = must(parse_rfc3339("2026-03-01T09:00:00Z"));
        let attachment = input.stamped(at);
        assert_eq!(attachment.uploaded_at, at);
    }

    #[test]
    fn empty_attachment_name_is_rejected() {
        let input = AttachmentInput {
            file_name: String::new(),
            file_url: "/uploads/x".to_string(),
            file_type: "image/png".to_string(),
        };
        assert!(matches!(input.validate(), Err(ReviewError::Validation(_))));
    }

    #[test]
    fn status_change_reports_target_status() {
        let at = must(parse_rfc3339("2026-03-01T09:00:00Z"));
        assert_eq!(StatusChange::Submitted { at }.status(), Status::Submitted);
        assert_eq!(
            StatusChange::Verified {
                at,
                by: ActorId::new()
            }
            .status(),
            Status::Verified
        );
        assert_eq!(
            StatusChange::Rejected {
                at,
                by: ActorId::new(),
                note: "evidence missing".to_string()
            }
            .status(),
            Status::Rejected
        );
    }

    #[test]
    fn rfc3339_round_trip_is_utc() {
        let parsed = must(parse_rfc3339("2026-03-01T09:00:00Z"));
        assert_eq!(must(rfc3339(parsed)), "2026-03-01T09:00:00Z");
    }
}
