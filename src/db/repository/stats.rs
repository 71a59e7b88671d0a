use rusqlite::Connection;
use serde::Serialize;

use crate::confidence::overall_confidence;
use crate::db::DatabaseError;

/// Dashboard counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_uploaded: i64,
    /// Documents that reached a review decision (approved or needs_review).
    pub processed: i64,
    pub needs_review: i64,
    /// Rounded mean of every set overall confidence; 0 when none are set.
    pub average_confidence: u8,
}

pub fn dashboard_stats(conn: &Connection) -> Result<DashboardStats, DatabaseError> {
    let (total_uploaded, processed, needs_review) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status IN ('approved', 'needs_review')), 0),
                COALESCE(SUM(status = 'needs_review'), 0)
         FROM documents",
        [],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT overall_confidence FROM documents WHERE overall_confidence IS NOT NULL",
    )?;
    let scores = stmt
        .query_map([], |row| row.get::<_, Option<u8>>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DashboardStats {
        total_uploaded,
        processed,
        needs_review,
        average_confidence: overall_confidence(&scores).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::document::tests::make_document;
    use crate::db::repository::update_status_if;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{DocumentStatus, DocumentType};

    #[test]
    fn empty_store_reports_zeroes() {
        let conn = open_memory_database().unwrap();
        let stats = dashboard_stats(&conn).unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total_uploaded: 0,
                processed: 0,
                needs_review: 0,
                average_confidence: 0,
            }
        );
    }

    #[test]
    fn counts_and_average_follow_statuses() {
        let conn = open_memory_database().unwrap();
        let a = make_document(&conn, DocumentType::Energy);
        let b = make_document(&conn, DocumentType::Energy);
        make_document(&conn, DocumentType::Transport);

        let up = [DocumentStatus::Uploaded];
        update_status_if(&conn, &a.id, &up, DocumentStatus::Approved, Some(90)).unwrap();
        update_status_if(&conn, &b.id, &up, DocumentStatus::NeedsReview, Some(71)).unwrap();

        let stats = dashboard_stats(&conn).unwrap();
        assert_eq!(stats.total_uploaded, 3);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.needs_review, 1);
        // (90 + 71) / 2 = 80.5 rounds up
        assert_eq!(stats.average_confidence, 81);
    }
}
