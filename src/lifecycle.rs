//! Document lifecycle state machine.
//!
//! ```text
//! uploaded ──► processing ──► needs_review ──► approved
//!    ▲             │    └──────────────────────► approved
//!    │             └──► failed
//!    └─ retry ◄────────── failed
//! ```
//!
//! Every transition is one conditional UPDATE keyed on the allowed source
//! states, so concurrent callers race on the row and exactly one wins.

use rusqlite::Connection;
use uuid::Uuid;

use crate::confidence::needs_review;
use crate::db::{self, DatabaseError};
use crate::models::enums::DocumentStatus;

/// The named transitions. Each has a fixed set of source states and a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Extraction dispatched, either automatically after upload or by retry.
    StartExtraction,
    /// Extraction returned with this overall confidence.
    CompleteExtraction { overall: Option<u8> },
    /// Extraction failed at any step.
    FailExtraction,
    /// A reviewer signed off.
    Approve,
}

impl Transition {
    pub fn allowed_from(self) -> &'static [DocumentStatus] {
        use DocumentStatus::*;
        match self {
            Self::StartExtraction => &[Uploaded, Failed],
            Self::CompleteExtraction { .. } | Self::FailExtraction => &[Processing],
            Self::Approve => &[NeedsReview],
        }
    }

    pub fn target(self) -> DocumentStatus {
        match self {
            Self::StartExtraction => DocumentStatus::Processing,
            Self::CompleteExtraction { overall } => {
                if needs_review(overall) {
                    DocumentStatus::NeedsReview
                } else {
                    DocumentStatus::Approved
                }
            }
            Self::FailExtraction => DocumentStatus::Failed,
            Self::Approve => DocumentStatus::Approved,
        }
    }

    /// The overall confidence written alongside the new status. Cleared on
    /// every state that is not a review decision.
    fn overall_confidence(self) -> Option<u8> {
        match self {
            Self::CompleteExtraction { overall } => overall,
            Self::Approve => Some(100),
            Self::StartExtraction | Self::FailExtraction => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StartExtraction => "start_extraction",
            Self::CompleteExtraction { .. } => "complete_extraction",
            Self::FailExtraction => "fail_extraction",
            Self::Approve => "approve",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot {transition} document {id} from status {from}")]
    InvalidTransition {
        id: Uuid,
        from: DocumentStatus,
        transition: &'static str,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Apply a transition as a single conditional write. Returns the new status.
///
/// When no row changes, the document is re-read to tell a missing document
/// apart from one in the wrong state.
pub fn apply(
    conn: &Connection,
    document_id: &Uuid,
    transition: Transition,
) -> Result<DocumentStatus, LifecycleError> {
    let target = transition.target();
    let changed = db::update_status_if(
        conn,
        document_id,
        transition.allowed_from(),
        target,
        transition.overall_confidence(),
    )?;

    if changed {
        tracing::info!(
            document_id = %document_id,
            transition = transition.name(),
            status = %target,
            "Document status changed"
        );
        return Ok(target);
    }

    match db::get_document(conn, document_id)? {
        None => Err(LifecycleError::NotFound(*document_id)),
        Some(doc) => Err(LifecycleError::InvalidTransition {
            id: *document_id,
            from: doc.status,
            transition: transition.name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::document::tests::make_document;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::DocumentType;
    use DocumentStatus::*;

    fn status(conn: &Connection, id: &Uuid) -> DocumentStatus {
        db::get_document(conn, id).unwrap().unwrap().status
    }

    #[test]
    fn happy_path_to_approved() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);

        assert_eq!(apply(&conn, &doc.id, Transition::StartExtraction).unwrap(), Processing);
        let done = Transition::CompleteExtraction { overall: Some(90) };
        assert_eq!(apply(&conn, &doc.id, done).unwrap(), Approved);

        let loaded = db::get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(loaded.overall_confidence, Some(90));
    }

    #[test]
    fn boundary_85_is_approved_84_is_review() {
        assert_eq!(Transition::CompleteExtraction { overall: Some(85) }.target(), Approved);
        assert_eq!(Transition::CompleteExtraction { overall: Some(84) }.target(), NeedsReview);
    }

    #[test]
    fn processing_never_returns_to_uploaded() {
        let transitions = [
            Transition::StartExtraction,
            Transition::CompleteExtraction { overall: Some(10) },
            Transition::CompleteExtraction { overall: Some(99) },
            Transition::CompleteExtraction { overall: None },
            Transition::FailExtraction,
            Transition::Approve,
        ];
        let from_processing: Vec<_> = transitions
            .iter()
            .filter(|t| t.allowed_from().contains(&Processing))
            .map(|t| t.target())
            .collect();
        assert!(!from_processing.is_empty());
        for target in from_processing {
            assert!(matches!(target, NeedsReview | Approved | Failed), "{target}");
        }
    }

    #[test]
    fn retry_from_processing_is_rejected() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);
        apply(&conn, &doc.id, Transition::StartExtraction).unwrap();

        let err = apply(&conn, &doc.id, Transition::StartExtraction).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { from: Processing, .. }));
        assert_eq!(status(&conn, &doc.id), Processing);
    }

    #[test]
    fn failed_can_be_retried() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);
        apply(&conn, &doc.id, Transition::StartExtraction).unwrap();
        apply(&conn, &doc.id, Transition::FailExtraction).unwrap();
        assert_eq!(status(&conn, &doc.id), Failed);

        assert_eq!(apply(&conn, &doc.id, Transition::StartExtraction).unwrap(), Processing);
    }

    #[test]
    fn approve_requires_needs_review() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);
        let err = apply(&conn, &doc.id, Transition::Approve).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { from: Uploaded, .. }));

        apply(&conn, &doc.id, Transition::StartExtraction).unwrap();
        apply(&conn, &doc.id, Transition::CompleteExtraction { overall: Some(70) }).unwrap();
        assert_eq!(apply(&conn, &doc.id, Transition::Approve).unwrap(), Approved);
        let loaded = db::get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(loaded.overall_confidence, Some(100));
    }

    #[test]
    fn failure_clears_overall_confidence() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);
        apply(&conn, &doc.id, Transition::StartExtraction).unwrap();
        apply(&conn, &doc.id, Transition::FailExtraction).unwrap();
        let loaded = db::get_document(&conn, &doc.id).unwrap().unwrap();
        assert!(loaded.overall_confidence.is_none());
    }

    #[test]
    fn missing_document_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = apply(&conn, &Uuid::new_v4(), Transition::StartExtraction).unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[test]
    fn second_racing_start_loses() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);
        let first = apply(&conn, &doc.id, Transition::StartExtraction);
        let second = apply(&conn, &doc.id, Transition::StartExtraction);
        assert!(first.is_ok());
        assert!(second.is_err());
    }
}
