use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{
    errors::AppError,
    notifications::{self, NotificationKind},
    structs::{Conversation, Message, RentalRequest, User},
    utils::now_string,
    AppState,
};

const MAX_MESSAGE_LEN: usize = 4000;

/// Conversation as seen by one participant.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub rental_request_id: i64,
    pub other_party_id: i64,
    pub unread: i64,
    pub last_message_at: Option<String>,
}

impl Conversation {
    fn is_participant(&self, user_id: i64) -> bool {
        user_id == self.brand_owner_id || user_id == self.store_owner_id
    }

    fn summary_for(&self, user_id: i64) -> ConversationSummary {
        let (other_party_id, unread) = if user_id == self.brand_owner_id {
            (self.store_owner_id, self.brand_unread)
        } else {
            (self.brand_owner_id, self.store_unread)
        };
        ConversationSummary {
            id: self.id,
            rental_request_id: self.rental_request_id,
            other_party_id,
            unread,
            last_message_at: self.last_message_at.clone(),
        }
    }
}

/// Opens the thread for a rental request; reuses it if it already exists.
pub async fn open_conversation(
    conn: &mut SqliteConnection,
    rental: &RentalRequest,
) -> Result<Conversation, AppError> {
    sqlx::query(
        "INSERT OR IGNORE INTO conversations \
         (rental_request_id, brand_owner_id, store_owner_id, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(rental.id)
    .bind(rental.brand_owner_id)
    .bind(rental.store_owner_id)
    .bind(now_string())
    .execute(&mut *conn)
    .await?;

    let conversation = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE rental_request_id = $1",
    )
    .bind(rental.id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(conversation)
}

async fn get_conversation(state: &AppState, id: i64) -> Result<Conversation, AppError> {
    sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation {}", id)))
}

async fn get_participant_conversation(
    state: &AppState,
    user: &User,
    conversation_id: i64,
) -> Result<Conversation, AppError> {
    let conversation = get_conversation(state, conversation_id).await?;
    if !conversation.is_participant(user.id) {
        return Err(AppError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

pub async fn list_conversations(
    state: &AppState,
    user: &User,
) -> Result<Vec<ConversationSummary>, AppError> {
    let conversations = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE brand_owner_id = $1 OR store_owner_id = $1 \
         ORDER BY COALESCE(last_message_at, created_at) DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(conversations
        .iter()
        .map(|c| c.summary_for(user.id))
        .collect())
}

pub async fn send_message(
    state: &AppState,
    sender: &User,
    conversation_id: i64,
    body: &str,
) -> Result<Message, AppError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }
    if body.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::Validation(format!(
            "Message is longer than {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    let conversation = get_participant_conversation(state, sender, conversation_id).await?;
    let (recipient, unread_column) = if sender.id == conversation.brand_owner_id {
        (conversation.store_owner_id, "store_unread")
    } else {
        (conversation.brand_owner_id, "brand_unread")
    };

    let created_at = now_string();
    let mut tx = state.db_pool.begin().await?;
    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (conversation_id, sender_id, body, created_at) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(conversation.id)
    .bind(sender.id)
    .bind(body)
    .bind(&created_at)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(&format!(
        "UPDATE conversations SET {col} = {col} + 1, last_message_at = $1 WHERE id = $2",
        col = unread_column
    ))
    .bind(&created_at)
    .bind(conversation.id)
    .execute(&mut *tx)
    .await?;

    let rental_id = conversation.rental_request_id.to_string();
    notifications::notify(
        &mut tx,
        recipient,
        NotificationKind::NewMessage,
        &[
            ("sender", sender.display_name.as_str()),
            ("rental_id", rental_id.as_str()),
        ],
    )
    .await?;
    tx.commit().await?;
    log::debug!("Message {} sent in conversation {}", message.id, conversation.id);
    Ok(message)
}

/// Returns the thread oldest first and clears the reader's unread counter.
pub async fn read_messages(
    state: &AppState,
    reader: &User,
    conversation_id: i64,
) -> Result<Vec<Message>, AppError> {
    let conversation = get_participant_conversation(state, reader, conversation_id).await?;
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY id ASC",
    )
    .bind(conversation.id)
    .fetch_all(&state.db_pool)
    .await?;

    let column = if reader.id == conversation.brand_owner_id {
        "brand_unread"
    } else {
        "store_unread"
    };
    sqlx::query(&format!("UPDATE conversations SET {} = 0 WHERE id = $1", column))
        .bind(conversation.id)
        .execute(&state.db_pool)
        .await?;
    Ok(messages)
}
