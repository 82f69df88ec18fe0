use serde::Serialize;
use sqlx::SqliteConnection;
use tera::{Context, Tera};

use crate::{errors::AppError, structs::Notification, utils::now_string, AppState};

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_templates(vec![
            (
                NotificationKind::RentalRequested.template(),
                include_str!("../templates/notifications/rental_requested.txt"),
            ),
            (
                NotificationKind::RentalStatusChanged.template(),
                include_str!("../templates/notifications/rental_status_changed.txt"),
            ),
            (
                NotificationKind::ClearanceAdvanced.template(),
                include_str!("../templates/notifications/clearance_advanced.txt"),
            ),
            (
                NotificationKind::NewMessage.template(),
                include_str!("../templates/notifications/new_message.txt"),
            ),
        ]) {
            log::error!("Parsing error(s): {}", e);
            ::std::process::exit(1);
        }
        tera
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RentalRequested,
    RentalStatusChanged,
    ClearanceAdvanced,
    NewMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RentalRequested => "rental_requested",
            NotificationKind::RentalStatusChanged => "rental_status_changed",
            NotificationKind::ClearanceAdvanced => "clearance_advanced",
            NotificationKind::NewMessage => "new_message",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            NotificationKind::RentalRequested => "rental_requested.txt",
            NotificationKind::RentalStatusChanged => "rental_status_changed.txt",
            NotificationKind::ClearanceAdvanced => "clearance_advanced.txt",
            NotificationKind::NewMessage => "new_message.txt",
        }
    }
}

pub fn render(kind: NotificationKind, vars: &[(&str, &str)]) -> Result<String, AppError> {
    let mut context = Context::new();
    for (key, value) in vars {
        context.insert(*key, value);
    }
    let rendered = TEMPLATES.render(kind.template(), &context).map_err(|e| {
        log::error!("Failed to render template: {}", e);
        AppError::TemplateError(e)
    })?;
    Ok(rendered.trim_end().to_string())
}

/// Inserts a notification on `conn`, so it commits or rolls back together
/// with the change it reports.
pub async fn notify(
    conn: &mut SqliteConnection,
    user_id: i64,
    kind: NotificationKind,
    vars: &[(&str, &str)],
) -> Result<Notification, AppError> {
    let message = render(kind, vars)?;
    let notification = sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (user_id, kind, message, read, created_at) \
         VALUES ($1, $2, $3, 0, $4) RETURNING *",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(message)
    .bind(now_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(notification)
}

/// Unread first, then newest first.
pub async fn list_for_user(state: &AppState, user_id: i64) -> Result<Vec<Notification>, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = $1 ORDER BY read ASC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(notifications)
}

pub async fn unread_count(state: &AppState, user_id: i64) -> Result<i64, AppError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = 0")
            .bind(user_id)
            .fetch_one(&state.db_pool)
            .await?;
    Ok(count)
}

pub async fn mark_read(state: &AppState, user_id: i64, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Notification {}", id)));
    }
    Ok(())
}

pub async fn mark_all_read(state: &AppState, user_id: i64) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = $1 AND read = 0")
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_marketplace, test_state};

    #[test]
    fn renders_status_with_spaces() {
        let text = render(
            NotificationKind::RentalStatusChanged,
            &[("rental_id", "12"), ("status", "payment_pending")],
        )
        .unwrap();
        assert_eq!(text, "Rental request #12 is now payment pending.");
    }

    #[test]
    fn missing_variable_is_an_error() {
        assert!(render(NotificationKind::NewMessage, &[("sender", "Acme")]).is_err());
    }

    #[actix_web::test]
    async fn read_flags() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let vars = [("sender", "Acme"), ("rental_id", "1")];
        let mut conn = state.db_pool.acquire().await.unwrap();
        let first = notify(&mut conn, m.brand.id, NotificationKind::NewMessage, &vars)
            .await
            .unwrap();
        notify(&mut conn, m.brand.id, NotificationKind::NewMessage, &vars)
            .await
            .unwrap();
        drop(conn);
        assert_eq!(unread_count(&state, m.brand.id).await.unwrap(), 2);

        mark_read(&state, m.brand.id, first.id).await.unwrap();
        let listed = list_for_user(&state, m.brand.id).await.unwrap();
        assert!(!listed[0].read);
        assert!(listed[1].read);

        // someone else's notification
        assert!(mark_read(&state, m.store_owner.id, first.id).await.is_err());

        assert_eq!(mark_all_read(&state, m.brand.id).await.unwrap(), 1);
        assert_eq!(unread_count(&state, m.brand.id).await.unwrap(), 0);
    }
}
