use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::db::{parse_opt_date, parse_timestamp, parse_uuid, timestamp_str, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

pub fn insert_transport_record(
    conn: &Connection,
    record: &TransportRecord,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO transport_records (id, receipt_created_date, supplier_code, supplier_name,
         ship_country, ship_area, destination_postcode, total_weight, transport_mode, uk_zone,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id.to_string(),
            record.receipt_created_date.map(|d: NaiveDate| d.format("%Y-%m-%d").to_string()),
            record.supplier_code,
            record.supplier_name,
            record.ship_country,
            record.ship_area,
            record.destination_postcode,
            record.total_weight,
            record.transport_mode.as_str(),
            record.uk_zone.as_str(),
            timestamp_str(&record.created_at),
        ],
    )?;
    Ok(())
}

/// Read-only reference data, most recent receipts first.
pub fn list_transport_records(conn: &Connection) -> Result<Vec<TransportRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, receipt_created_date, supplier_code, supplier_name, ship_country, ship_area,
         destination_postcode, total_weight, transport_mode, uk_zone, created_at
         FROM transport_records
         ORDER BY receipt_created_date DESC, created_at DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<f64>>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, receipt, code, name, country, area, postcode, weight, mode, zone, created)| {
                Ok(TransportRecord {
                    id: parse_uuid(&id)?,
                    receipt_created_date: parse_opt_date(receipt),
                    supplier_code: code,
                    supplier_name: name,
                    ship_country: country,
                    ship_area: area,
                    destination_postcode: postcode,
                    total_weight: weight,
                    transport_mode: TransportMode::from_str(&mode)?,
                    uk_zone: UkZone::from_str(&zone)?,
                    created_at: parse_timestamp(&created)?,
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use uuid::Uuid;

    fn record(date: (i32, u32, u32), mode: TransportMode) -> TransportRecord {
        TransportRecord {
            id: Uuid::new_v4(),
            receipt_created_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            supplier_code: Some("SUP-01".into()),
            supplier_name: Some("Acme Freight".into()),
            ship_country: Some("GB".into()),
            ship_area: None,
            destination_postcode: Some("KW15 1AA".into()),
            total_weight: Some(120.5),
            transport_mode: mode,
            uk_zone: UkZone::Island,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn list_returns_newest_receipts_first() {
        let conn = open_memory_database().unwrap();
        insert_transport_record(&conn, &record((2026, 1, 5), TransportMode::Road)).unwrap();
        insert_transport_record(&conn, &record((2026, 2, 9), TransportMode::Sea)).unwrap();

        let rows = list_transport_records(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transport_mode, TransportMode::Sea);
        assert_eq!(rows[1].uk_zone, UkZone::Island);
    }
}
