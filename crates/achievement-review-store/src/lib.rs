#![forbid(unsafe_code)]

//! Store contracts for the two halves of an achievement record, plus the
//! profile directory consumed from the identity layer.
//!
//! No shared transaction exists across implementations of these traits; the
//! coordinator owns cross-store ordering and compensation.

use std::collections::BTreeMap;

use achievement_review_domain::{
    AchievementDetail, AchievementId, AchievementReference, ActorId, Attachment, DetailRef,
    NewReference, ReviewError, Status, StatusChange, StudentId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewestFirst => "newest_first",
            Self::OldestFirst => "oldest_first",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "newest_first" => Some(Self::NewestFirst),
            "oldest_first" => Some(Self::OldestFirst),
            _ => None,
        }
    }
}

/// Conjunctive filter over references. An absent field places no constraint;
/// soft-deleted rows are never returned regardless of the filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReferenceFilter {
    pub student: Option<StudentId>,
    pub students: Option<Vec<StudentId>>,
    pub statuses: Option<Vec<Status>>,
}

/// Relational half: authoritative identity, ownership, status, timestamps.
pub trait ReferenceStore {
    /// Creates the reference row and returns the generated id.
    #[allow(clippy::missing_errors_doc)]
    fn create(&self, reference: &NewReference) -> Result<AchievementId, ReviewError>;

    /// Fetches one live reference. Soft-deleted rows read as absent.
    #[allow(clippy::missing_errors_doc)]
    fn get(&self, id: AchievementId) -> Result<AchievementReference, ReviewError>;

    /// Returns one page of matching references plus the total match count.
    /// Ordering is by creation time with id as the deterministic tie-break.
    #[allow(clippy::missing_errors_doc)]
    fn list_filtered(
        &self,
        filter: &ReferenceFilter,
        sort: SortOrder,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<AchievementReference>, u64), ReviewError>;

    /// Conditional status write: applies `change` only where the row's
    /// current status equals `expected`. A zero-row update surfaces as
    /// [`ReviewError::Conflict`] (row exists with another status) or
    /// [`ReviewError::NotFound`] (row absent), so a lost race is observable
    /// to the caller rather than silently double-applied.
    #[allow(clippy::missing_errors_doc)]
    fn update_status(
        &self,
        id: AchievementId,
        expected: Status,
        change: &StatusChange,
    ) -> Result<(), ReviewError>;

    /// Soft delete under the same conditional-write discipline. The row is
    /// never physically removed.
    #[allow(clippy::missing_errors_doc)]
    fn soft_delete(&self, id: AchievementId, expected: Status) -> Result<(), ReviewError>;
}

/// Document half: descriptive payload and attachments, keyed by opaque ref.
pub trait DetailStore {
    /// Inserts a new document and returns its generated ref.
    #[allow(clippy::missing_errors_doc)]
    fn insert(&self, detail: &AchievementDetail) -> Result<DetailRef, ReviewError>;

    #[allow(clippy::missing_errors_doc)]
    fn get(&self, detail_ref: &DetailRef) -> Result<AchievementDetail, ReviewError>;

    /// Best-effort batch fetch: missing refs are silently omitted from the
    /// result so one lost document cannot break a whole listing.
    #[allow(clippy::missing_errors_doc)]
    fn get_many(
        &self,
        detail_refs: &[DetailRef],
    ) -> Result<BTreeMap<DetailRef, AchievementDetail>, ReviewError>;

    #[allow(clippy::missing_errors_doc)]
    fn update(&self, detail_ref: &DetailRef, detail: &AchievementDetail) -> Result<(), ReviewError>;

    #[allow(clippy::missing_errors_doc)]
    fn delete(&self, detail_ref: &DetailRef) -> Result<(), ReviewError>;

    #[allow(clippy::missing_errors_doc)]
    fn append_attachment(
        &self,
        detail_ref: &DetailRef,
        attachment: &Attachment,
    ) -> Result<(), ReviewError>;
}

/// Read-only identity relationships resolved by the excluded identity layer.
/// A lookup failure must end in denial at the caller, never in access.
pub trait ProfileDirectory {
    /// Resolves an authenticated actor to their student profile, if any.
    #[allow(clippy::missing_errors_doc)]
    fn student_for_actor(&self, actor: ActorId) -> Result<Option<StudentId>, ReviewError>;

    /// Lists the students currently supervised by the given advisor.
    #[allow(clippy::missing_errors_doc)]
    fn advisees_of(&self, advisor: ActorId) -> Result<Vec<StudentId>, ReviewError>;
}
