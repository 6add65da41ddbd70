#![forbid(unsafe_code)]

//! Lifecycle coordination across the two record halves.
//!
//! The relational reference and the JSON document live in stores with no
//! shared transaction, so every multi-store operation here follows the same
//! discipline: write the document first, then the reference, and compensate
//! with a best-effort delete when the second write fails. Compensation
//! failures are logged and swallowed; the caller always sees the original
//! error. An orphaned document is harmless because the reference is the
//! source of truth for existence.
//!
//! All status moves go through the reference store's conditional write, so a
//! lost race surfaces as [`ReviewError::Conflict`] instead of being applied
//! twice.

use achievement_review_domain::{
    ensure_non_empty, now_utc, AchievementId, AchievementReference, Actor, Attachment,
    AttachmentInput, CreatedView, DateTimeUtc, DetailContent, DetailRef, DetailView,
    LifecycleEvent, LifecycleEventKind, NewReference, Page, PageMeta, RecordSummary, ReviewError,
    Role, Status, StatusChange, StudentId,
};
use achievement_review_policy::{authorize_read, Decision};
use achievement_review_store::{
    DetailStore, ProfileDirectory, ReferenceFilter, ReferenceStore, SortOrder,
};

/// Time source. Injectable so tests can pin timestamps.
pub type Clock = fn() -> DateTimeUtc;

pub struct LifecycleCoordinator<'a> {
    references: &'a dyn ReferenceStore,
    details: &'a dyn DetailStore,
    directory: &'a dyn ProfileDirectory,
    clock: Clock,
}

impl<'a> LifecycleCoordinator<'a> {
    #[must_use]
    pub fn new(
        references: &'a dyn ReferenceStore,
        details: &'a dyn DetailStore,
        directory: &'a dyn ProfileDirectory,
    ) -> Self {
        Self {
            references,
            details,
            directory,
            clock: now_utc,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Creates a draft record: document first, then reference, with a
    /// compensating document delete if the reference insert fails.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] for bad content,
    /// [`ReviewError::NotFound`] when the actor has no student profile, and
    /// store errors otherwise.
    pub fn create(&self, actor: &Actor, content: DetailContent) -> Result<CreatedView, ReviewError> {
        content.validate()?;
        let student_id = self.student_profile(actor)?;

        let detail_ref = self.details.insert(&content.into_detail())?;
        let reference = NewReference {
            student_id,
            detail_ref: detail_ref.clone(),
            created_at: (self.clock)(),
        };

        match self.references.create(&reference) {
            Ok(id) => Ok(CreatedView {
                id,
                status: Status::Draft,
            }),
            Err(err) => {
                if let Err(cleanup) = self.details.delete(&detail_ref) {
                    tracing::warn!(
                        detail_ref = %detail_ref,
                        error = %cleanup,
                        "orphaned detail document left behind after reference insert failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// Replaces the descriptive content of a draft. Attachments are carried
    /// over unchanged; only [`LifecycleCoordinator::attach`] may grow them.
    ///
    /// # Errors
    /// Returns [`ReviewError::InvalidState`] unless the record is a draft,
    /// [`ReviewError::Forbidden`] for non-owners.
    pub fn update(
        &self,
        actor: &Actor,
        id: AchievementId,
        content: DetailContent,
    ) -> Result<(), ReviewError> {
        content.validate()?;
        let reference = self.owned_reference(actor, id)?;
        ensure_status(&reference, Status::Draft)?;

        let existing = self.details.get(&reference.detail_ref)?;
        self.details.update(
            &reference.detail_ref,
            &content.into_detail_with_attachments(existing.attachments),
        )
    }

    /// Moves a draft to `submitted`, stamping the submission time.
    ///
    /// # Errors
    /// Returns [`ReviewError::InvalidState`] unless the record is a draft,
    /// [`ReviewError::Conflict`] on a lost race.
    pub fn submit(&self, actor: &Actor, id: AchievementId) -> Result<(), ReviewError> {
        let reference = self.owned_reference(actor, id)?;
        ensure_transition(&reference, Status::Draft, Status::Submitted)?;
        self.references.update_status(
            id,
            Status::Draft,
            &StatusChange::Submitted { at: (self.clock)() },
        )
    }

    /// Marks a submitted record verified, recording the reviewer.
    ///
    /// # Errors
    /// Returns [`ReviewError::Forbidden`] for non-reviewer roles,
    /// [`ReviewError::InvalidState`] unless the record is submitted.
    pub fn verify(&self, actor: &Actor, id: AchievementId) -> Result<(), ReviewError> {
        ensure_reviewer(actor)?;
        let reference = self.references.get(id)?;
        ensure_transition(&reference, Status::Submitted, Status::Verified)?;
        self.references.update_status(
            id,
            Status::Submitted,
            &StatusChange::Verified {
                at: (self.clock)(),
                by: actor.id,
            },
        )
    }

    /// Marks a submitted record rejected with a mandatory note.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] for an empty note before any state
    /// is touched, [`ReviewError::Forbidden`] for non-reviewer roles,
    /// [`ReviewError::InvalidState`] unless the record is submitted.
    pub fn reject(&self, actor: &Actor, id: AchievementId, note: &str) -> Result<(), ReviewError> {
        ensure_reviewer(actor)?;
        ensure_non_empty("rejection note", note)?;

        let reference = self.references.get(id)?;
        ensure_transition(&reference, Status::Submitted, Status::Rejected)?;
        self.references.update_status(
            id,
            Status::Submitted,
            &StatusChange::Rejected {
                at: (self.clock)(),
                by: actor.id,
                note: note.trim().to_string(),
            },
        )
    }

    /// Soft-deletes a draft, then best-effort removes its document. Document
    /// removal failure is logged and swallowed: the reference is already
    /// gone, so the record no longer exists to callers either way.
    ///
    /// # Errors
    /// Returns [`ReviewError::InvalidState`] unless the record is a draft,
    /// [`ReviewError::Forbidden`] for non-owners.
    pub fn delete(&self, actor: &Actor, id: AchievementId) -> Result<(), ReviewError> {
        let reference = self.owned_reference(actor, id)?;
        ensure_transition(&reference, Status::Draft, Status::Deleted)?;
        self.references.soft_delete(id, Status::Draft)?;

        if let Err(cleanup) = self.details.delete(&reference.detail_ref) {
            tracing::warn!(
                achievement = %id,
                detail_ref = %reference.detail_ref,
                error = %cleanup,
                "detail document cleanup failed after soft delete"
            );
        }
        Ok(())
    }

    /// Appends an attachment to a draft's document, stamping the upload time
    /// server-side.
    ///
    /// # Errors
    /// Returns [`ReviewError::Validation`] for a bad tuple,
    /// [`ReviewError::InvalidState`] unless the record is a draft.
    pub fn attach(
        &self,
        actor: &Actor,
        id: AchievementId,
        input: AttachmentInput,
    ) -> Result<Attachment, ReviewError> {
        input.validate()?;
        let reference = self.owned_reference(actor, id)?;
        ensure_status(&reference, Status::Draft)?;

        let attachment = input.stamped((self.clock)());
        self.details
            .append_attachment(&reference.detail_ref, &attachment)?;
        Ok(attachment)
    }

    /// Merged single-record view, gated by the read policy.
    ///
    /// # Errors
    /// Returns [`ReviewError::Forbidden`] on a policy denial and
    /// [`ReviewError::NotFound`] when either half is missing.
    pub fn detail(&self, actor: &Actor, id: AchievementId) -> Result<DetailView, ReviewError> {
        let reference = self.readable_reference(actor, id)?;
        let details = self.details.get(&reference.detail_ref)?;
        Ok(DetailView {
            id: reference.id,
            status: reference.status,
            rejection_note: reference.rejection_note,
            details,
            created_at: reference.created_at,
        })
    }

    /// Lifecycle history derived from the reference's timestamps, gated by
    /// the read policy.
    ///
    /// # Errors
    /// Returns [`ReviewError::Forbidden`] on a policy denial.
    pub fn history(
        &self,
        actor: &Actor,
        id: AchievementId,
    ) -> Result<Vec<LifecycleEvent>, ReviewError> {
        let reference = self.readable_reference(actor, id)?;
        Ok(project_history(&reference))
    }

    fn student_profile(&self, actor: &Actor) -> Result<StudentId, ReviewError> {
        self.directory
            .student_for_actor(actor.id)?
            .ok_or_else(|| ReviewError::NotFound(format!("no student profile for actor {}", actor.id)))
    }

    fn owned_reference(
        &self,
        actor: &Actor,
        id: AchievementId,
    ) -> Result<AchievementReference, ReviewError> {
        let reference = self.references.get(id)?;
        let student_id = self.student_profile(actor)?;
        if reference.student_id != student_id {
            return Err(ReviewError::Forbidden(
                "only the owning student may modify this record".to_string(),
            ));
        }
        Ok(reference)
    }

    fn readable_reference(
        &self,
        actor: &Actor,
        id: AchievementId,
    ) -> Result<AchievementReference, ReviewError> {
        let reference = self.references.get(id)?;
        match authorize_read(actor, &reference, self.directory)? {
            Decision::Allow => Ok(reference),
            Decision::Deny { reason } => Err(ReviewError::Forbidden(reason)),
        }
    }
}

fn ensure_reviewer(actor: &Actor) -> Result<(), ReviewError> {
    if actor.role.can_review() {
        Ok(())
    } else {
        Err(ReviewError::Forbidden(format!(
            "role {} may not review submissions",
            actor.role
        )))
    }
}

fn ensure_status(reference: &AchievementReference, required: Status) -> Result<(), ReviewError> {
    if reference.status == required {
        Ok(())
    } else {
        Err(ReviewError::InvalidState {
            required,
            actual: reference.status,
        })
    }
}

fn ensure_transition(
    reference: &AchievementReference,
    required: Status,
    next: Status,
) -> Result<(), ReviewError> {
    if reference.status == required && reference.status.may_transition(next) {
        Ok(())
    } else {
        Err(ReviewError::InvalidState {
            required,
            actual: reference.status,
        })
    }
}

/// Derives the lifecycle history from a reference. Nothing is persisted; the
/// sequence is recomputed from the status timestamps on every call, so it
/// carries at most one terminal review event.
#[must_use]
pub fn project_history(reference: &AchievementReference) -> Vec<LifecycleEvent> {
    let mut events = vec![LifecycleEvent {
        kind: LifecycleEventKind::Created,
        at: reference.created_at,
        by: None,
        note: Some("Achievement draft created".to_string()),
    }];

    if let Some(at) = reference.submitted_at {
        events.push(LifecycleEvent {
            kind: LifecycleEventKind::Submitted,
            at,
            by: None,
            note: Some("Submitted for verification".to_string()),
        });
    }

    if let Some(at) = reference.verified_at {
        let (kind, note) = if reference.status == Status::Rejected {
            (LifecycleEventKind::Rejected, reference.rejection_note.clone())
        } else {
            (LifecycleEventKind::Verified, None)
        };
        events.push(LifecycleEvent {
            kind,
            at,
            by: reference.verified_by,
            note,
        });
    }

    events
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// Listing parameters as they arrive from the excluded transport layer.
/// Absent values fall back to the projection defaults; out-of-range values
/// are clamped rather than refused.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<Status>,
    pub sort: SortOrder,
}

/// Builds role-scoped, paginated listings by merging reference pages with
/// their documents.
pub struct ListProjector<'a> {
    references: &'a dyn ReferenceStore,
    details: &'a dyn DetailStore,
    directory: &'a dyn ProfileDirectory,
    config: ProjectionConfig,
}

impl<'a> ListProjector<'a> {
    #[must_use]
    pub fn new(
        references: &'a dyn ReferenceStore,
        details: &'a dyn DetailStore,
        directory: &'a dyn ProfileDirectory,
    ) -> Self {
        Self {
            references,
            details,
            directory,
            config: ProjectionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ProjectionConfig) -> Self {
        self.config = config;
        self
    }

    /// One page of merged summaries visible to `actor`. The total count comes
    /// from the reference store; a reference whose document has gone missing
    /// is dropped from the page without failing the listing.
    ///
    /// # Errors
    /// Returns [`ReviewError::NotFound`] when a student actor has no profile,
    /// and store errors otherwise.
    pub fn list(
        &self,
        actor: &Actor,
        request: &ListRequest,
    ) -> Result<Page<RecordSummary>, ReviewError> {
        let page = request.page.unwrap_or(1).max(1);
        let limit = request
            .page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);

        let mut filter = ReferenceFilter::default();
        match actor.role {
            Role::Student => {
                let student = self.directory.student_for_actor(actor.id)?.ok_or_else(|| {
                    ReviewError::NotFound(format!("no student profile for actor {}", actor.id))
                })?;
                filter.student = Some(student);
                filter.statuses = request.status.map(|status| vec![status]);
            }
            Role::Advisor => {
                // Drafts stay invisible to advisors no matter what filter
                // they ask for.
                if request.status == Some(Status::Draft) {
                    return Ok(empty_page(page, limit));
                }
                let advisees = self.directory.advisees_of(actor.id)?;
                if advisees.is_empty() {
                    return Ok(empty_page(page, limit));
                }
                filter.students = Some(advisees);
                filter.statuses = Some(request.status.map_or_else(
                    || vec![Status::Submitted, Status::Verified],
                    |status| vec![status],
                ));
            }
            Role::Admin => {
                filter.statuses = request.status.map(|status| vec![status]);
            }
        }

        let offset = u64::from(page - 1) * u64::from(limit);
        let (references, total) = self
            .references
            .list_filtered(&filter, request.sort, limit, offset)?;

        let refs: Vec<DetailRef> = references
            .iter()
            .map(|reference| reference.detail_ref.clone())
            .collect();
        let mut documents = self.details.get_many(&refs)?;

        let mut data = Vec::with_capacity(references.len());
        for reference in references {
            let Some(detail) = documents.remove(&reference.detail_ref) else {
                continue;
            };
            data.push(RecordSummary {
                id: reference.id,
                student_id: reference.student_id,
                status: reference.status,
                title: detail.content.title,
                achievement_type: detail.content.achievement_type,
                points: detail.content.points,
                submitted_at: reference.submitted_at,
                created_at: reference.created_at,
            });
        }

        Ok(Page {
            data,
            meta: page_meta(page, limit, total),
        })
    }
}

fn page_meta(page: u32, limit: u32, total: u64) -> PageMeta {
    let total_pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
    PageMeta {
        current_page: page,
        total_pages,
        total_data: total,
        limit,
    }
}

fn empty_page(page: u32, limit: u32) -> Page<RecordSummary> {
    Page {
        data: Vec::new(),
        meta: page_meta(page, limit, 0),
    }
}
