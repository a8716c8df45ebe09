//! Scheduled cleanup jobs.
//!
//! Each job is a single statement (or one transaction) against the shared
//! database and reports how many rows it touched.

use chrono::{DateTime, Duration, Utc};
use portal::config::CleanupConfig;
use rusqlite::{params, Connection, Result as SqliteResult};
use uuid::Uuid;

use crate::db::timestamp;

/// Rows affected by one cleanup tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub magic_codes: usize,
    pub sessions: usize,
    pub rate_limits: usize,
    pub notifications: usize,
    pub audit_logs: usize,
    pub reminders: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.magic_codes
            + self.sessions
            + self.rate_limits
            + self.notifications
            + self.audit_logs
            + self.reminders
    }
}

/// Run every job once.
pub fn run_all(
    conn: &mut Connection,
    settings: &CleanupConfig,
    now: DateTime<Utc>,
) -> SqliteResult<CleanupReport> {
    Ok(CleanupReport {
        magic_codes: purge_magic_codes(conn, now)?,
        sessions: purge_sessions(conn, now)?,
        rate_limits: purge_rate_limits(conn, now)?,
        notifications: purge_read_notifications(conn, settings.notification_retention_days, now)?,
        audit_logs: purge_audit_logs(conn, settings.audit_retention_days, now)?,
        reminders: send_reminders(conn, settings.reminder_lead_minutes, now)?,
    })
}

/// Codes that expired or were already used.
pub fn purge_magic_codes(conn: &Connection, now: DateTime<Utc>) -> SqliteResult<usize> {
    conn.execute(
        "DELETE FROM magic_codes WHERE expires_at < ?1 OR used_at IS NOT NULL",
        [timestamp(now)],
    )
}

pub fn purge_sessions(conn: &Connection, now: DateTime<Utc>) -> SqliteResult<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at < ?1",
        [timestamp(now)],
    )
}

/// Rate-limit windows that have closed.
pub fn purge_rate_limits(conn: &Connection, now: DateTime<Utc>) -> SqliteResult<usize> {
    conn.execute(
        "DELETE FROM rate_limits WHERE window_start_ms + window_ms <= ?1",
        [now.timestamp_millis()],
    )
}

/// Read notifications created more than `retention_days` ago.
pub fn purge_read_notifications(
    conn: &Connection,
    retention_days: u32,
    now: DateTime<Utc>,
) -> SqliteResult<usize> {
    let cutoff = now - Duration::days(i64::from(retention_days));
    conn.execute(
        "DELETE FROM notifications WHERE read_at IS NOT NULL AND created_at < ?1",
        [timestamp(cutoff)],
    )
}

/// Audit entries older than `retention_days`; `0` keeps everything.
pub fn purge_audit_logs(
    conn: &Connection,
    retention_days: u32,
    now: DateTime<Utc>,
) -> SqliteResult<usize> {
    if retention_days == 0 {
        return Ok(0);
    }
    let cutoff = now - Duration::days(i64::from(retention_days));
    conn.execute(
        "DELETE FROM audit_logs WHERE created_at < ?1",
        [timestamp(cutoff)],
    )
}

struct DueConsultation {
    id: String,
    patient_id: String,
    provider_id: Option<String>,
    reason: String,
    scheduled_at: String,
    room_url: Option<String>,
}

/// Notify both participants of scheduled consultations starting within
/// `lead_minutes`. Each consultation is reminded once.
///
/// Returns the number of consultations reminded.
pub fn send_reminders(
    conn: &mut Connection,
    lead_minutes: u32,
    now: DateTime<Utc>,
) -> SqliteResult<usize> {
    let now_ts = timestamp(now);
    let until = timestamp(now + Duration::minutes(i64::from(lead_minutes)));

    let tx = conn.transaction()?;
    let due = {
        let mut stmt = tx.prepare(
            "SELECT id, patient_id, provider_id, reason, scheduled_at, room_url
             FROM consultations
             WHERE status = 'scheduled' AND reminded_at IS NULL
               AND scheduled_at > ?1 AND scheduled_at <= ?2
             ORDER BY scheduled_at",
        )?;
        let rows = stmt.query_map([&now_ts, &until], |row| {
            Ok(DueConsultation {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                provider_id: row.get(2)?,
                reason: row.get(3)?,
                scheduled_at: row.get(4)?,
                room_url: row.get(5)?,
            })
        })?;
        let due: Vec<DueConsultation> = rows.collect::<SqliteResult<_>>()?;
        due
    };

    for consultation in &due {
        let body = format!(
            "Your consultation \"{}\" starts at {}.",
            consultation.reason, consultation.scheduled_at
        );
        let recipients =
            std::iter::once(&consultation.patient_id).chain(consultation.provider_id.as_ref());
        for member_id in recipients {
            tx.execute(
                "INSERT INTO notifications (id, member_id, kind, title, body, link, created_at)
                 VALUES (?1, ?2, 'reminder', 'Consultation reminder', ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    member_id,
                    body,
                    consultation.room_url,
                    now_ts,
                ],
            )?;
        }
        tx.execute(
            "UPDATE consultations SET reminded_at = ?1 WHERE id = ?2",
            params![now_ts, consultation.id],
        )?;
        tracing::debug!(consultation_id = %consultation.id, "Reminder queued");
    }

    tx.commit()?;
    Ok(due.len())
}
