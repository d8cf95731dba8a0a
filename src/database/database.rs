use tokio_rusqlite::Connection;
use std::path::Path;
use log::info;
use thiserror::Error;
use std::sync::Arc;
use chrono::{DateTime, Utc};

use crate::extract::InvoiceFields;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Insert returned no row identifier")]
    MissingRowId,
}

/// An invoice row as persisted. `customer_id` is the store-assigned
/// monotonic identifier; upload-order position is never stored and is
/// derived fresh by the document builder.
#[derive(Debug, Clone)]
pub struct StoredInvoice {
    pub customer_id: i64,
    pub invoice_number: String,
    pub customer: String,
    pub supplier: String,
    pub invoice_date: String,
    pub items: String,
    pub total_amount: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn: Arc::new(conn),
        };
        db.initialize().await?;
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn: Arc::new(conn),
        };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        // Create tables if they don't exist
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS invoices (
                        customer_id INTEGER PRIMARY KEY AUTOINCREMENT,
                        invoice_number TEXT NOT NULL,
                        customer TEXT NOT NULL,
                        supplier TEXT NOT NULL,
                        invoice_date TEXT NOT NULL,
                        items TEXT NOT NULL,
                        total_amount TEXT NOT NULL,
                        vector_embedding TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS invoice_images (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        invoice_id INTEGER NOT NULL,
                        image_path TEXT NOT NULL,
                        ocr_text TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS chat_history (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        invoice_id INTEGER NOT NULL,
                        role TEXT NOT NULL,
                        content TEXT NOT NULL,
                        timestamp TEXT NOT NULL
                    );",
                )
            })
            .await?;

        info!("Database initialized successfully");
        Ok(())
    }

    /// Insert an invoice and return its assigned identifier. Yielding no
    /// identifier is a hard failure; the caller must not write secondary
    /// rows without one.
    pub async fn insert_invoice(
        &self,
        fields: InvoiceFields,
        embedding: Vec<f32>,
    ) -> Result<i64, DatabaseError> {
        let vector_embedding = serde_json::to_string(&embedding).unwrap_or_else(|_| "[]".to_string());

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO invoices
                     (invoice_number, customer, supplier, invoice_date, items, total_amount, vector_embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    [
                        &fields.invoice_number,
                        &fields.customer,
                        &fields.supplier,
                        &fields.invoice_date,
                        &fields.items,
                        &fields.total_amount,
                        &vector_embedding,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        if id <= 0 {
            return Err(DatabaseError::MissingRowId);
        }
        Ok(id)
    }

    pub async fn insert_invoice_image(
        &self,
        invoice_id: i64,
        image_path: String,
        ocr_text: String,
    ) -> Result<i64, DatabaseError> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO invoice_images (invoice_id, image_path, ocr_text)
                     VALUES (?1, ?2, ?3)",
                    [&invoice_id.to_string(), &image_path, &ocr_text],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        if id <= 0 {
            return Err(DatabaseError::MissingRowId);
        }
        Ok(id)
    }

    pub async fn insert_chat_message(
        &self,
        invoice_id: i64,
        role: String,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO chat_history (invoice_id, role, content, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    [
                        &invoice_id.to_string(),
                        &role,
                        &content,
                        &timestamp.to_rfc3339(),
                    ],
                )
            })
            .await?;

        Ok(())
    }

    /// All invoices in upload order (ascending identifier). The document
    /// builder derives positions from this ordering.
    pub async fn fetch_all_invoices(&self) -> Result<Vec<StoredInvoice>, DatabaseError> {
        let result = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT customer_id, invoice_number, customer, supplier,
                            invoice_date, items, total_amount, vector_embedding
                     FROM invoices
                     ORDER BY customer_id ASC",
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok(StoredInvoice {
                        customer_id: row.get::<_, i64>(0)?,
                        invoice_number: row.get::<_, String>(1)?,
                        customer: row.get::<_, String>(2)?,
                        supplier: row.get::<_, String>(3)?,
                        invoice_date: row.get::<_, String>(4)?,
                        items: row.get::<_, String>(5)?,
                        total_amount: row.get::<_, String>(6)?,
                        embedding: serde_json::from_str(&row.get::<_, String>(7)?)
                            .unwrap_or_default(),
                    })
                })?;

                let mut invoices = Vec::new();
                for row in rows {
                    invoices.push(row?);
                }

                Ok(invoices)
            })
            .await?;

        Ok(result)
    }

    pub async fn fetch_latest_invoice(&self) -> Result<Option<StoredInvoice>, DatabaseError> {
        let result = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT customer_id, invoice_number, customer, supplier,
                            invoice_date, items, total_amount, vector_embedding
                     FROM invoices
                     ORDER BY customer_id DESC
                     LIMIT 1",
                )?;

                let mut rows = stmt.query_map([], |row| {
                    Ok(StoredInvoice {
                        customer_id: row.get::<_, i64>(0)?,
                        invoice_number: row.get::<_, String>(1)?,
                        customer: row.get::<_, String>(2)?,
                        supplier: row.get::<_, String>(3)?,
                        invoice_date: row.get::<_, String>(4)?,
                        items: row.get::<_, String>(5)?,
                        total_amount: row.get::<_, String>(6)?,
                        embedding: serde_json::from_str(&row.get::<_, String>(7)?)
                            .unwrap_or_default(),
                    })
                })?;

                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await?;

        Ok(result)
    }

    /// Image record for an invoice: (image_path, ocr_text).
    pub async fn fetch_invoice_image(
        &self,
        invoice_id: i64,
    ) -> Result<Option<(String, String)>, DatabaseError> {
        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT image_path, ocr_text
                     FROM invoice_images
                     WHERE invoice_id = ?
                     LIMIT 1",
                )?;

                let mut rows = stmt.query_map([invoice_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await?;

        Ok(result)
    }

    /// Chat transcript for one invoice, oldest first: (role, content, timestamp).
    pub async fn fetch_chat_history(
        &self,
        invoice_id: i64,
    ) -> Result<Vec<(String, String, String)>, DatabaseError> {
        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT role, content, timestamp
                     FROM chat_history
                     WHERE invoice_id = ?
                     ORDER BY id ASC",
                )?;

                let rows = stmt.query_map([invoice_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;

                let mut messages = Vec::new();
                for row in rows {
                    messages.push(row?);
                }

                Ok(messages)
            })
            .await?;

        Ok(result)
    }

    /// Test hook for simulating secondary-write failures.
    #[cfg(test)]
    pub async fn drop_table(&self, table: &str) -> Result<(), DatabaseError> {
        let sql = format!("DROP TABLE {}", table);
        self.conn.call(move |conn| conn.execute_batch(&sql)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields(number: &str, customer: &str) -> InvoiceFields {
        InvoiceFields {
            invoice_number: number.to_string(),
            invoice_date: "2025-05-06".to_string(),
            total_amount: "100".to_string(),
            supplier: "Amazon".to_string(),
            customer: customer.to_string(),
            items: "Shoes | Kurta".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_returns_positive_ascending_ids() {
        let db = Database::open_in_memory().await.unwrap();
        let first = db
            .insert_invoice(sample_fields("INV-2001", "K. Patel"), vec![0.1, 0.2])
            .await
            .unwrap();
        let second = db
            .insert_invoice(sample_fields("INV-2002", "N. Singh"), vec![0.3, 0.4])
            .await
            .unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[tokio::test]
    async fn fetch_all_is_in_upload_order() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_invoice(sample_fields("INV-2001", "K. Patel"), vec![])
            .await
            .unwrap();
        db.insert_invoice(sample_fields("INV-2002", "N. Singh"), vec![])
            .await
            .unwrap();

        let invoices = db.fetch_all_invoices().await.unwrap();
        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0].invoice_number, "INV-2001");
        assert_eq!(invoices[1].invoice_number, "INV-2002");
        assert!(invoices[0].customer_id < invoices[1].customer_id);
    }

    #[tokio::test]
    async fn fetch_latest_returns_newest() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.fetch_latest_invoice().await.unwrap().is_none());

        db.insert_invoice(sample_fields("INV-2001", "K. Patel"), vec![])
            .await
            .unwrap();
        db.insert_invoice(sample_fields("INV-2002", "N. Singh"), vec![])
            .await
            .unwrap();

        let latest = db.fetch_latest_invoice().await.unwrap().unwrap();
        assert_eq!(latest.invoice_number, "INV-2002");
    }

    #[tokio::test]
    async fn embedding_round_trips_through_storage() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_invoice(sample_fields("INV-2001", "K. Patel"), vec![0.5, -1.0, 2.0])
            .await
            .unwrap();

        let invoices = db.fetch_all_invoices().await.unwrap();
        assert_eq!(invoices[0].embedding, vec![0.5, -1.0, 2.0]);
    }

    #[tokio::test]
    async fn chat_history_keeps_insertion_order() {
        let db = Database::open_in_memory().await.unwrap();
        let id = db
            .insert_invoice(sample_fields("INV-2001", "K. Patel"), vec![])
            .await
            .unwrap();

        db.insert_chat_message(id, "user".to_string(), "first invoice?".to_string(), Utc::now())
            .await
            .unwrap();
        db.insert_chat_message(id, "bot".to_string(), "INV-2001.".to_string(), Utc::now())
            .await
            .unwrap();

        let history = db.fetch_chat_history(id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, "user");
        assert_eq!(history[1].0, "bot");
        assert_eq!(history[1].1, "INV-2001.");
    }

    #[tokio::test]
    async fn failed_secondary_write_leaves_invoice_intact() {
        let db = Database::open_in_memory().await.unwrap();
        let id = db
            .insert_invoice(sample_fields("INV-2001", "K. Patel"), vec![])
            .await
            .unwrap();

        db.drop_table("invoice_images").await.unwrap();
        let result = db
            .insert_invoice_image(id, "scan.png".to_string(), "ocr".to_string())
            .await;
        assert!(result.is_err());

        // The primary record is untouched and still queryable.
        let invoices = db.fetch_all_invoices().await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].customer_id, id);
    }
}
