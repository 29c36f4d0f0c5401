//! Stored payment operations

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rusqlite::params;

use super::{conversion_error, Database};
use crate::error::Result;
use crate::models::{DbStats, StoredPayment};

impl Database {
    /// List stored rows, oldest transaction first
    ///
    /// Restricted to one upload when `upload_id` is given.
    pub fn list_payments(&self, upload_id: Option<i64>, limit: i64) -> Result<Vec<StoredPayment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.upload_id, t.transaction_date, p.name, t.payer_name,
                   t.patient_name, t.cash_applied, t.payment_type
            FROM payment_transactions t
            LEFT JOIN providers p ON t.provider_id = p.id
            WHERE (?1 IS NULL OR t.upload_id = ?1)
            ORDER BY t.transaction_date, t.id
            LIMIT ?2
            "#,
        )?;

        let payments = stmt
            .query_map(params![upload_id, limit], |row| {
                let date_str: String = row.get(2)?;
                let amount_str: String = row.get(6)?;

                Ok(StoredPayment {
                    id: row.get(0)?,
                    upload_id: row.get(1)?,
                    transaction_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                        .map_err(|e| conversion_error(2, e))?,
                    provider: row.get(3)?,
                    payer_name: row.get(4)?,
                    patient_name: row.get(5)?,
                    cash_applied: Decimal::from_str(&amount_str)
                        .map_err(|e| conversion_error(6, e))?,
                    payment_type: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(payments)
    }

    /// Count stored rows
    pub fn count_payments(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM payment_transactions", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Row counts for the status overview
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        Ok(DbStats {
            uploads: count("SELECT COUNT(*) FROM uploads")?,
            payments: count("SELECT COUNT(*) FROM payment_transactions")?,
            providers: count("SELECT COUNT(*) FROM providers")?,
            failed_rows: count("SELECT COUNT(*) FROM upload_issues WHERE severity = 'error'")?,
        })
    }
}
