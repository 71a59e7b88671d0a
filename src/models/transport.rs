use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{TransportMode, UkZone};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRecord {
    pub id: Uuid,
    pub receipt_created_date: Option<NaiveDate>,
    pub supplier_code: Option<String>,
    pub supplier_name: Option<String>,
    pub ship_country: Option<String>,
    pub ship_area: Option<String>,
    pub destination_postcode: Option<String>,
    pub total_weight: Option<f64>,
    pub transport_mode: TransportMode,
    pub uk_zone: UkZone,
    pub created_at: DateTime<Utc>,
}
