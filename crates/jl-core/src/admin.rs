//! Operator queries used by the CLI. None of these are exposed over HTTP.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation;

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub handle: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub post_id: Uuid,
    pub reporter_id: Uuid,
    pub reason: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Open,
    Dismissed,
    Actioned,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Dismissed => "dismissed",
            ReportStatus::Actioned => "actioned",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(ReportStatus::Open),
            "dismissed" => Ok(ReportStatus::Dismissed),
            "actioned" => Ok(ReportStatus::Actioned),
            other => Err(anyhow!("unknown report status: {other}")),
        }
    }
}

pub async fn list_users(pool: &Pool<Postgres>) -> Result<Vec<UserSummary>> {
    let rows = sqlx::query(
        "SELECT id, email, display_name, handle, email_verified, created_at \
         FROM users ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        users.push(UserSummary {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            handle: row.try_get("handle")?,
            email_verified: row.try_get("email_verified")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(users)
}

pub async fn list_reports(
    pool: &Pool<Postgres>,
    status: Option<ReportStatus>,
) -> Result<Vec<ReportSummary>> {
    let rows = sqlx::query(
        "SELECT id, post_id, reporter_id, reason, status, created_at \
         FROM moderation_reports \
         WHERE ($1::TEXT IS NULL OR status = $1) \
         ORDER BY created_at ASC",
    )
    .bind(status.map(|status| status.as_str()))
    .fetch_all(pool)
    .await?;

    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        reports.push(ReportSummary {
            id: row.try_get("id")?,
            post_id: row.try_get("post_id")?,
            reporter_id: row.try_get("reporter_id")?,
            reason: row.try_get("reason")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(reports)
}

/// Marks an account verified and drops its outstanding verification tokens.
/// Used when a verification link expired before the user followed it.
pub async fn verify_user(pool: &Pool<Postgres>, email: &str) -> Result<UserSummary> {
    let email = validation::normalize_email(email)?;

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE email = $1 \
         RETURNING id, email, display_name, handle, email_verified, created_at",
    )
    .bind(&email)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Err(anyhow!("user not found: {email}"));
    };
    let user = UserSummary {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        handle: row.try_get("handle")?,
        email_verified: row.try_get("email_verified")?,
        created_at: row.try_get("created_at")?,
    };

    sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(user)
}

/// Closes an open report. `Actioned` also hides the reported post.
pub async fn resolve_report(
    pool: &Pool<Postgres>,
    report_id: Uuid,
    status: ReportStatus,
) -> Result<ReportSummary> {
    if status == ReportStatus::Open {
        return Err(anyhow!("a report can only be resolved as dismissed or actioned"));
    }

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "UPDATE moderation_reports SET status = $2 \
         WHERE id = $1 AND status = 'open' \
         RETURNING id, post_id, reporter_id, reason, status, created_at",
    )
    .bind(report_id)
    .bind(status.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Err(anyhow!("open report not found: {report_id}"));
    };

    let report = ReportSummary {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        reporter_id: row.try_get("reporter_id")?,
        reason: row.try_get("reason")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    };

    if status == ReportStatus::Actioned {
        sqlx::query("UPDATE posts SET is_deleted = TRUE WHERE id = $1")
            .bind(report.post_id)
            .execute(&mut *tx)
            .await?;
        tracing::info!(
            report_id = %report.id,
            post_id = %report.post_id,
            "reported post removed"
        );
    }

    tx.commit().await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_status_parses_known_values() {
        assert_eq!("open".parse::<ReportStatus>().unwrap(), ReportStatus::Open);
        assert_eq!(
            " Actioned ".parse::<ReportStatus>().unwrap(),
            ReportStatus::Actioned
        );
        assert_eq!(ReportStatus::Dismissed.to_string(), "dismissed");
        assert!("closed".parse::<ReportStatus>().is_err());
    }
}
