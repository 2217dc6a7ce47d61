use crate::core::errors::GateError;
use crate::core::models::{Invoice, InvoiceStatus, InviteLog, PaymentTransition};
use crate::infrastructure::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, GateError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrate(&conn)?;
        info!("Database opened at {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, GateError> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, GateError>
    where
        F: FnOnce(&Connection) -> Result<T, GateError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GateError::DatabaseError(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }
}

fn migrate(conn: &Connection) -> Result<(), GateError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS invoices (
            invoice_id   TEXT PRIMARY KEY,
            user_id      INTEGER NOT NULL DEFAULT 0,
            amount       INTEGER NOT NULL DEFAULT 0,
            status       TEXT NOT NULL DEFAULT 'PENDING',
            groups_json  TEXT NOT NULL DEFAULT '[]',
            qris_payload TEXT
        );

        CREATE TABLE IF NOT EXISTS invite_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id  TEXT NOT NULL,
            group_id    TEXT NOT NULL,
            invite_link TEXT,
            error       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_invite_logs_invoice
            ON invite_logs(invoice_id, id);
        ",
    )?;

    // Databases written by earlier deployments lack the timestamp columns.
    ensure_column(conn, "invoices", "created_at", "INTEGER")?;
    ensure_column(conn, "invoices", "paid_at", "INTEGER")?;
    ensure_column(conn, "invite_logs", "created_at", "INTEGER")?;

    info!("Database migrations complete");
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<(), GateError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == column);
    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))?;
        info!(table, column, "Added missing column");
    }
    Ok(())
}

fn from_timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<(Invoice, String)> {
    let status: Option<String> = row.get("status")?;
    let groups_json: Option<String> = row.get("groups_json")?;
    let invoice = Invoice {
        invoice_id: row.get("invoice_id")?,
        user_id: row.get::<_, Option<i64>>("user_id")?.unwrap_or_default(),
        groups: Vec::new(),
        amount: row.get::<_, Option<i64>>("amount")?.unwrap_or_default(),
        status: status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(InvoiceStatus::Pending),
        qr_payload: row.get("qris_payload")?,
        created_at: from_timestamp(row.get("created_at")?).unwrap_or_default(),
        paid_at: from_timestamp(row.get("paid_at")?),
    };
    Ok((invoice, groups_json.unwrap_or_else(|| "[]".to_string())))
}

fn decode_groups((mut invoice, groups_json): (Invoice, String)) -> Result<Invoice, GateError> {
    // Older rows may hold numeric ids.
    let raw: Vec<serde_json::Value> = serde_json::from_str(&groups_json)?;
    invoice.groups = raw
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect();
    Ok(invoice)
}

fn query_invoice(conn: &Connection, invoice_id: &str) -> Result<Option<Invoice>, GateError> {
    conn.query_row(
        "SELECT * FROM invoices WHERE invoice_id = ?1",
        [invoice_id],
        invoice_from_row,
    )
    .optional()?
    .map(decode_groups)
    .transpose()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_invoice(&self, invoice: Invoice) -> Result<(), GateError> {
        let groups_json = serde_json::to_string(&invoice.groups)?;
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO invoices (invoice_id, user_id, amount, groups_json, status, qris_payload, created_at, paid_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    invoice.invoice_id,
                    invoice.user_id,
                    invoice.amount,
                    groups_json,
                    invoice.status.to_string(),
                    invoice.qr_payload,
                    invoice.created_at.timestamp(),
                    invoice.paid_at.map(|t| t.timestamp()),
                ],
            )?;
            if inserted == 0 {
                return Err(GateError::InvoiceAlreadyExists(invoice.invoice_id.clone()));
            }
            Ok(())
        })
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, GateError> {
        self.with_conn(|conn| query_invoice(conn, invoice_id))
    }

    async fn list_invoices(&self, limit: usize) -> Result<Vec<Invoice>, GateError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM invoices ORDER BY created_at DESC LIMIT ?1")?;
            let rows = stmt
                .query_map([limit as i64], invoice_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(decode_groups).collect()
        })
    }

    async fn mark_paid(&self, invoice_id: &str, paid_at: DateTime<Utc>) -> Result<Option<PaymentTransition>, GateError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE invoices SET status = 'PAID', paid_at = ?1
                 WHERE invoice_id = ?2 AND UPPER(COALESCE(status, '')) != 'PAID'",
                params![paid_at.timestamp(), invoice_id],
            )?;
            Ok(query_invoice(conn, invoice_id)?.map(|invoice| {
                if changed > 0 {
                    PaymentTransition::Transitioned(invoice)
                } else {
                    PaymentTransition::AlreadyPaid(invoice)
                }
            }))
        })
    }

    async fn save_qr_payload(&self, invoice_id: &str, data_url: &str) -> Result<(), GateError> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE invoices SET qris_payload = ?1 WHERE invoice_id = ?2",
                params![data_url, invoice_id],
            )?;
            if updated == 0 {
                return Err(GateError::InvoiceNotFound(invoice_id.to_string()));
            }
            Ok(())
        })
    }

    async fn append_invite_log(&self, log: InviteLog) -> Result<(), GateError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO invite_logs (invoice_id, group_id, invite_link, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    log.invoice_id,
                    log.group_id,
                    log.invite_link,
                    log.error,
                    log.created_at.timestamp()
                ],
            )?;
            Ok(())
        })
    }

    async fn list_invite_logs(&self, invoice_id: &str) -> Result<Vec<InviteLog>, GateError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT invoice_id, group_id, invite_link, error, created_at
                 FROM invite_logs WHERE invoice_id = ?1 ORDER BY id ASC",
            )?;
            let logs = stmt
                .query_map([invoice_id], |row| {
                    Ok(InviteLog {
                        invoice_id: row.get(0)?,
                        group_id: row.get(1)?,
                        invite_link: row.get(2)?,
                        error: row.get(3)?,
                        created_at: from_timestamp(row.get(4)?).unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(logs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(id: &str) -> Invoice {
        Invoice::new(id.to_string(), 42, vec!["-1001".to_string(), "-1002".to_string()], 25_000)
    }

    #[tokio::test]
    async fn invoice_round_trips_through_sqlite() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.create_invoice(invoice("a")).await.unwrap();

        let loaded = store.get_invoice("a").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, 42);
        assert_eq!(loaded.groups, vec!["-1001", "-1002"]);
        assert_eq!(loaded.status, InvoiceStatus::Pending);
        assert!(loaded.paid_at.is_none());
        assert!(store.get_invoice("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_invoice_is_rejected() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.create_invoice(invoice("a")).await.unwrap();
        let err = store.create_invoice(invoice("a")).await.unwrap_err();
        assert!(matches!(err, GateError::InvoiceAlreadyExists(_)));
    }

    #[tokio::test]
    async fn mark_paid_transitions_once() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.create_invoice(invoice("a")).await.unwrap();

        let first_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let first = store.mark_paid("a", first_at).await.unwrap().unwrap();
        assert!(matches!(first, PaymentTransition::Transitioned(_)));
        assert_eq!(first.invoice().paid_at, Some(first_at));

        let later = DateTime::from_timestamp(1_800_000_000, 0).unwrap();
        let second = store.mark_paid("a", later).await.unwrap().unwrap();
        assert!(matches!(second, PaymentTransition::AlreadyPaid(_)));
        assert_eq!(second.invoice().status, InvoiceStatus::Paid);
        assert_eq!(second.invoice().paid_at, Some(first_at));

        assert!(store.mark_paid("missing", later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn qr_payload_and_invite_logs_persist() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.create_invoice(invoice("a")).await.unwrap();
        store.save_qr_payload("a", "data:image/png;base64,AAAA").await.unwrap();
        assert_eq!(
            store.get_invoice("a").await.unwrap().unwrap().qr_payload.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert!(store.save_qr_payload("missing", "x").await.is_err());

        store
            .append_invite_log(InviteLog::sent("a", "-1001", "https://t.me/+one"))
            .await
            .unwrap();
        store
            .append_invite_log(InviteLog::failed("a", "-1002", None, "Forbidden"))
            .await
            .unwrap();
        store
            .append_invite_log(InviteLog::sent("b", "-1001", "https://t.me/+two"))
            .await
            .unwrap();

        let logs = store.list_invite_logs("a").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].group_id, "-1001");
        assert_eq!(logs[1].error.as_deref(), Some("Forbidden"));
    }

    #[test]
    fn legacy_schema_gains_timestamp_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (invoice_id TEXT PRIMARY KEY, user_id INTEGER, amount INTEGER,
                                    status TEXT, groups_json TEXT, qris_payload TEXT);
             INSERT INTO invoices VALUES ('old', 7, 1000, 'pending', '[-100123]', NULL);",
        )
        .unwrap();
        migrate(&conn).unwrap();

        let invoice = query_invoice(&conn, "old").unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.groups, vec!["-100123"]);
        assert!(invoice.paid_at.is_none());
    }
}
