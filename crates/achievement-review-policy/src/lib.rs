#![forbid(unsafe_code)]

//! Read-authorization policy.
//!
//! One pure decision function instead of per-handler conditionals: the role
//! variants are a small closed set, and the advisor relationship arrives as
//! an explicit lookup capability so the policy stays independently testable.
//! Any lookup failure surfaces as an error, which callers must treat as a
//! denial (fail closed); a directory outage can never widen access.

use achievement_review_domain::{AchievementReference, Actor, ReviewError, Role, Status};
use achievement_review_store::ProfileDirectory;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }
}

/// Decides whether `actor` may read `reference`.
///
/// Students see only their own records. Advisors see records of their current
/// advisees, and never drafts. Administrators read everything; their
/// lifecycle actions remain gated elsewhere by [`Role::can_review`].
///
/// # Errors
/// Returns [`ReviewError::Io`] when the directory lookup fails; the caller
/// must deny on that path.
pub fn authorize_read(
    actor: &Actor,
    reference: &AchievementReference,
    directory: &dyn ProfileDirectory,
) -> Result<Decision, ReviewError> {
    match actor.role {
        Role::Admin => Ok(Decision::Allow),
        Role::Student => {
            let Some(student_id) = directory.student_for_actor(actor.id)? else {
                return Ok(Decision::deny(format!(
                    "actor {} has no student profile",
                    actor.id
                )));
            };
            if student_id == reference.student_id {
                Ok(Decision::Allow)
            } else {
                Ok(Decision::deny("students may only read their own records"))
            }
        }
        Role::Advisor => {
            let advisees = directory.advisees_of(actor.id)?;
            if !advisees.contains(&reference.student_id) {
                return Ok(Decision::deny(format!(
                    "student {} is not an advisee of actor {}",
                    reference.student_id, actor.id
                )));
            }
            if reference.status == Status::Draft {
                return Ok(Decision::deny("draft records are not visible to advisors"));
            }
            Ok(Decision::Allow)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use achievement_review_domain::{
        parse_rfc3339, AchievementId, ActorId, DetailRef, StudentId,
    };
    use std::collections::BTreeMap;

    struct FixtureDirectory {
        students: BTreeMap<ActorId, StudentId>,
        advisees: BTreeMap<ActorId, Vec<StudentId>>,
        failing: bool,
    }

    impl FixtureDirectory {
        fn new() -> Self {
            Self {
                students: BTreeMap::new(),
                advisees: BTreeMap::new(),
                failing: false,
            }
        }
    }

    impl ProfileDirectory for FixtureDirectory {
        fn student_for_actor(&self, actor: ActorId) -> Result<Option<StudentId>, ReviewError> {
            if self.failing {
                return Err(ReviewError::Io("directory unavailable".to_string()));
            }
            Ok(self.students.get(&actor).copied())
        }

        fn advisees_of(&self, advisor: ActorId) -> Result<Vec<StudentId>, ReviewError> {
            if self.failing {
                return Err(ReviewError::Io("directory unavailable".to_string()));
            }
            Ok(self.advisees.get(&advisor).cloned().unwrap_or_default())
        }
    }

    fn must<T>(result: Result<T, ReviewError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn fixture_reference(owner: StudentId, status: Status) -> AchievementReference {
        let created_at = match parse_rfc3339("2026-03-01T09:00:00Z") {
            Ok(value) => value,
            Err(err) => panic!("invalid fixture timestamp: {err}"),
        };
        AchievementReference {
            id: AchievementId::new(),
            student_id: owner,
            detail_ref: DetailRef("doc-1".to_string()),
            status,
            rejection_note: None,
            verified_by: None,
            created_at,
            submitted_at: None,
            verified_at: None,
        }
    }

    #[test]
    fn owner_reads_own_record() {
        let actor = ActorId::new();
        let student = StudentId::new();
        let mut directory = FixtureDirectory::new();
        directory.students.insert(actor, student);

        let reference = fixture_reference(student, Status::Draft);
        let decision = must(authorize_read(
            &Actor {
                id: actor,
                role: Role::Student,
            },
            &reference,
            &directory,
        ));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn student_cannot_read_another_students_record() {
        let actor = ActorId::new();
        let mut directory = FixtureDirectory::new();
        directory.students.insert(actor, StudentId::new());

        let reference = fixture_reference(StudentId::new(), Status::Submitted);
        let decision = must(authorize_read(
            &Actor {
                id: actor,
                role: Role::Student,
            },
            &reference,
            &directory,
        ));
        assert!(matches!(decision, Decision::Deny { .. }));
    }

    #[test]
    fn actor_without_student_profile_is_denied() {
        let directory = FixtureDirectory::new();
        let reference = fixture_reference(StudentId::new(), Status::Draft);
        let decision = must(authorize_read(
            &Actor {
                id: ActorId::new(),
                role: Role::Student,
            },
            &reference,
            &directory,
        ));
        assert!(matches!(decision, Decision::Deny { .. }));
    }

    #[test]
    fn advisor_never_sees_drafts_of_advisees() {
        let advisor = ActorId::new();
        let student = StudentId::new();
        let mut directory = FixtureDirectory::new();
        directory.advisees.insert(advisor, vec![student]);

        let actor = Actor {
            id: advisor,
            role: Role::Advisor,
        };

        let draft = fixture_reference(student, Status::Draft);
        assert!(matches!(
            must(authorize_read(&actor, &draft, &directory)),
            Decision::Deny { .. }
        ));

        let submitted = fixture_reference(student, Status::Submitted);
        assert_eq!(
            must(authorize_read(&actor, &submitted, &directory)),
            Decision::Allow
        );
    }

    #[test]
    fn advisor_denied_for_non_advisee() {
        let advisor = ActorId::new();
        let mut directory = FixtureDirectory::new();
        directory.advisees.insert(advisor, vec![StudentId::new()]);

        let reference = fixture_reference(StudentId::new(), Status::Submitted);
        let decision = must(authorize_read(
            &Actor {
                id: advisor,
                role: Role::Advisor,
            },
            &reference,
            &directory,
        ));
        assert!(matches!(decision, Decision::Deny { .. }));
    }

    #[test]
    fn admin_reads_everything() {
        let directory = FixtureDirectory::new();
        let reference = fixture_reference(StudentId::new(), Status::Draft);
        let decision = must(authorize_read(
            &Actor {
                id: ActorId::new(),
                role: Role::Admin,
            },
            &reference,
            &directory,
        ));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn directory_failure_surfaces_as_error_not_allow() {
        let mut directory = FixtureDirectory::new();
        directory.failing = true;

        let reference = fixture_reference(StudentId::new(), Status::Submitted);
        for role in [Role::Student, Role::Advisor] {
            let result = authorize_read(
                &Actor {
                    id: ActorId::new(),
                    role,
                },
                &reference,
                &directory,
            );
            assert!(matches!(result, Err(ReviewError::Io(_))));
        }
    }
}
