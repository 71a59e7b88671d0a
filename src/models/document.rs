use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::enums::{DocumentStatus, DocumentType};
use crate::confidence::ConfidenceBand;

/// Serialized with a derived `confidence_band` beside `overall_confidence`.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    /// Storage reference: a bare object key, or a full URL on legacy rows.
    pub file_url: Option<String>,
    pub document_type: DocumentType,
    pub supplier_name: Option<String>,
    pub status: DocumentStatus,
    pub overall_confidence: Option<u8>,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: Option<Uuid>,
}

impl Document {
    pub fn confidence_band(&self) -> Option<ConfidenceBand> {
        ConfidenceBand::for_score(self.overall_confidence)
    }
}

#[derive(Serialize)]
struct DocumentView<'a> {
    id: &'a Uuid,
    filename: &'a str,
    file_url: &'a Option<String>,
    document_type: &'a DocumentType,
    supplier_name: &'a Option<String>,
    status: &'a DocumentStatus,
    overall_confidence: Option<u8>,
    confidence_band: Option<ConfidenceBand>,
    uploaded_at: &'a DateTime<Utc>,
    uploaded_by: &'a Option<Uuid>,
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DocumentView {
            id: &self.id,
            filename: &self.filename,
            file_url: &self.file_url,
            document_type: &self.document_type,
            supplier_name: &self.supplier_name,
            status: &self.status,
            overall_confidence: self.overall_confidence,
            confidence_band: self.confidence_band(),
            uploaded_at: &self.uploaded_at,
            uploaded_by: &self.uploaded_by,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::open_memory_database;
    use crate::db::repository::document::tests::make_document;
    use crate::models::enums::DocumentType;

    #[test]
    fn band_follows_overall_confidence() {
        let conn = open_memory_database().unwrap();
        let mut doc = make_document(&conn, DocumentType::Energy);
        doc.overall_confidence = None;
        assert!(serde_json::to_value(&doc).unwrap()["confidence_band"].is_null());

        for (score, band) in [(84, "low"), (85, "medium"), (89, "medium"), (90, "high")] {
            doc.overall_confidence = Some(score);
            let json = serde_json::to_value(&doc).unwrap();
            assert_eq!(json["overall_confidence"], score);
            assert_eq!(json["confidence_band"], band, "score {score}");
        }
    }
}
