//! Database module for the portal server.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::repo::RepoError;

/// Thread-safe database connection pool.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize database with schema.
///
/// Creates all tables for the portal:
/// - `members`: patients, providers, pharmacies and admins
/// - `sessions`: login sessions created by magic-link verification
/// - `magic_codes`: hashed one-time sign-in codes
/// - `rate_limits`: fixed-window counters per bucket key
/// - `intakes`, `consultations`, `prescriptions`: the clinical records
/// - `notifications`: per-member inbox
/// - `audit_logs`: append-only record of mutations
/// - `passkeys`: registered WebAuthn credential identifiers
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file (use `:memory:` for in-memory)
///
/// # Errors
///
/// Returns an error if the database cannot be opened or schema creation fails.
pub fn init_db<P: AsRef<Path>>(path: P) -> SqliteResult<DbPool> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            display_name TEXT,
            npi TEXT,
            npi_verified INTEGER NOT NULL DEFAULT 0,
            fax_number TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_members_role ON members(role);

        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

        CREATE TABLE IF NOT EXISTS magic_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            code_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used_at TEXT,
            attempts INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_magic_codes_email ON magic_codes(email);

        CREATE TABLE IF NOT EXISTS rate_limits (
            key TEXT PRIMARY KEY,
            window_start_ms INTEGER NOT NULL,
            window_ms INTEGER NOT NULL,
            count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS intakes (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL REFERENCES members(id),
            chief_complaint TEXT NOT NULL,
            symptoms TEXT,
            medications TEXT,
            allergies TEXT,
            medical_history TEXT,
            status TEXT NOT NULL DEFAULT 'submitted',
            summary TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_intakes_patient ON intakes(patient_id);
        CREATE INDEX IF NOT EXISTS idx_intakes_status ON intakes(status);

        CREATE TABLE IF NOT EXISTS consultations (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL REFERENCES members(id),
            provider_id TEXT REFERENCES members(id),
            intake_id TEXT REFERENCES intakes(id),
            reason TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            room_name TEXT,
            room_url TEXT,
            notes TEXT,
            reminded_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_consultations_patient ON consultations(patient_id);
        CREATE INDEX IF NOT EXISTS idx_consultations_provider ON consultations(provider_id);
        CREATE INDEX IF NOT EXISTS idx_consultations_schedule ON consultations(status, scheduled_at);

        CREATE TABLE IF NOT EXISTS prescriptions (
            id TEXT PRIMARY KEY,
            consultation_id TEXT NOT NULL REFERENCES consultations(id),
            patient_id TEXT NOT NULL REFERENCES members(id),
            provider_id TEXT NOT NULL REFERENCES members(id),
            pharmacy_id TEXT REFERENCES members(id),
            medication TEXT NOT NULL,
            dosage TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            refills INTEGER NOT NULL DEFAULT 0,
            instructions TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            fax_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id);
        CREATE INDEX IF NOT EXISTS idx_prescriptions_pharmacy ON prescriptions(pharmacy_id);
        CREATE INDEX IF NOT EXISTS idx_prescriptions_consultation ON prescriptions(consultation_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            link TEXT,
            read_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_member ON notifications(member_id, created_at);

        CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            detail TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_logs(created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_logs(actor_id);

        CREATE TABLE IF NOT EXISTS passkeys (
            credential_id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            label TEXT,
            public_key TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_used_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_passkeys_member ON passkeys(member_id);
        ",
    )?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Lock the connection, mapping a poisoned mutex to [`RepoError::LockPoisoned`].
pub fn lock(db: &DbPool) -> Result<MutexGuard<'_, Connection>, RepoError> {
    db.lock().map_err(|_| RepoError::LockPoisoned)
}

/// Canonical stored form of a timestamp.
///
/// Millisecond precision with a `Z` suffix keeps lexical and chronological
/// order identical, which the expiry queries rely on.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time in canonical stored form.
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn names(db: &DbPool, kind: &str) -> Vec<String> {
        let conn = db.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = ?1")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        names
    }

    #[test]
    fn test_init_db_creates_tables() {
        let db = init_db(":memory:").expect("Failed to init db");
        let tables = names(&db, "table");

        for table in [
            "members",
            "sessions",
            "magic_codes",
            "rate_limits",
            "intakes",
            "consultations",
            "prescriptions",
            "notifications",
            "audit_logs",
            "passkeys",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_init_db_creates_indexes() {
        let db = init_db(":memory:").expect("Failed to init db");
        let indexes = names(&db, "index");

        assert!(indexes.contains(&"idx_magic_codes_email".to_string()));
        assert!(indexes.contains(&"idx_consultations_schedule".to_string()));
        assert!(indexes.contains(&"idx_notifications_member".to_string()));
        assert!(indexes.contains(&"idx_audit_entity".to_string()));
    }

    #[test]
    fn test_init_db_idempotent() {
        let dir = std::env::temp_dir().join(format!("portal-db-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("portal.db");

        init_db(&path).expect("First init");
        init_db(&path).expect("Schema should be idempotent");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_foreign_key_enforcement() {
        let db = init_db(":memory:").expect("Failed to init db");
        let conn = db.lock().unwrap();

        let result = conn.execute(
            "INSERT INTO intakes (id, patient_id, chief_complaint, created_at, updated_at)
             VALUES ('i1', 'nobody', 'cough', '2025-01-01T00:00:00.000Z', '2025-01-01T00:00:00.000Z')",
            [],
        );

        assert!(
            result.is_err(),
            "Foreign key constraint should prevent orphaned intake"
        );
    }

    #[test]
    fn test_member_email_unique() {
        let db = init_db(":memory:").expect("Failed to init db");
        let conn = db.lock().unwrap();

        conn.execute(
            "INSERT INTO members (id, email, role, created_at) VALUES ('m1', 'a@example.com', 'patient', 'now')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO members (id, email, role, created_at) VALUES ('m2', 'a@example.com', 'patient', 'now')",
            [],
        );
        assert!(result.is_err(), "Duplicate email should fail");
    }

    #[test]
    fn test_timestamp_format_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2025, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();

        assert_eq!(timestamp(early), "2025-01-09T23:59:59.000Z");
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(parse_timestamp(&timestamp(late)), Some(late));
        assert_eq!(parse_timestamp("not a time"), None);
    }
}
