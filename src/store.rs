//! MySQL credential store and session/message log.
//!
//! Three tables: `users`, `sessions`, `messages`. Deleting a user cascades to
//! their sessions, deleting a session cascades to its messages. Conversation
//! order is timestamp order; there is no explicit sequence number.

use chrono::NaiveDateTime;
use mysql_async::{params, prelude::Queryable, OptsBuilder, Pool};
use tracing::{debug, info};

use crate::llm::ChatMessage;
use crate::{Error, Result};

/// Credential hash sentinel for users created through federated login.
pub const FEDERATED_LOGIN_SENTINEL: &str = "FEDERATED_LOGIN";

/// Characters of the first query kept as the session title.
const TITLE_CHARS: usize = 30;

/// A registered user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub role: String,
}

/// One chat session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub created_at: NaiveDateTime,
}

/// One stored message.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

/// Totals across the store.
#[derive(Debug, Clone, Copy)]
pub struct StoreTotals {
    pub users: u64,
    pub sessions: u64,
    pub messages: u64,
}

/// Relational store over a MySQL pool.
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn new(opts: OptsBuilder) -> Self {
        Self {
            pool: Pool::new(opts),
        }
    }

    /// Create tables if they don't exist.
    pub async fn init_schema(&self) -> Result<()> {
        const TABLES: [&str; 3] = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                hashed_password VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                role VARCHAR(16) NOT NULL DEFAULT 'user'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                session_id VARCHAR(64) NOT NULL,
                role VARCHAR(16) NOT NULL,
                content TEXT NOT NULL,
                timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )
            "#,
        ];

        let mut conn = self.pool.get_conn().await?;
        for table in TABLES {
            conn.query_drop(table).await?;
        }

        info!("Database schema initialized");
        Ok(())
    }

    /// Register a new user with a pre-hashed credential.
    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserRecord> {
        if self.find_user_by_email(email).await?.is_some() {
            return Err(Error::EmailTaken(email.to_string()));
        }

        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "INSERT INTO users (email, hashed_password, role) VALUES (:email, :hash, 'user')",
            params! { "email" => email, "hash" => password_hash },
        )
        .await?;

        info!("Registered user {}", email);

        self.find_user_by_email(email)
            .await?
            .ok_or_else(|| Error::Unknown("user vanished after insert".to_string()))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let mut conn = self.pool.get_conn().await?;

        let row: Option<(i64, String, String, bool, String)> = conn
            .exec_first(
                "SELECT id, email, hashed_password, is_active, role \
                 FROM users WHERE email = :email",
                params! { "email" => email },
            )
            .await?;

        Ok(row.map(|(id, email, hashed_password, is_active, role)| UserRecord {
            id,
            email,
            hashed_password,
            is_active,
            role,
        }))
    }

    /// First federated login creates the user with the sentinel credential;
    /// later logins promote the role to admin when the email matches.
    pub async fn login_federated(&self, email: &str, admin_email: &str) -> Result<UserRecord> {
        let role = crate::auth::resolve_role(email, admin_email);

        match self.find_user_by_email(email).await? {
            Some(user) => {
                if role == "admin" && user.role != "admin" {
                    let mut conn = self.pool.get_conn().await?;
                    conn.exec_drop(
                        "UPDATE users SET role = 'admin' WHERE id = :id",
                        params! { "id" => user.id },
                    )
                    .await?;
                    info!("Promoted {} to admin", email);
                    return Ok(UserRecord {
                        role: "admin".to_string(),
                        ..user
                    });
                }
                Ok(user)
            }
            None => {
                let mut conn = self.pool.get_conn().await?;
                conn.exec_drop(
                    "INSERT INTO users (email, hashed_password, is_active, role) \
                     VALUES (:email, :hash, TRUE, :role)",
                    params! {
                        "email" => email,
                        "hash" => FEDERATED_LOGIN_SENTINEL,
                        "role" => role,
                    },
                )
                .await?;

                info!("Created federated user {} ({})", email, role);

                self.find_user_by_email(email)
                    .await?
                    .ok_or_else(|| Error::Unknown("user vanished after insert".to_string()))
            }
        }
    }

    /// Compare a pre-hashed credential at the store level.
    ///
    /// The sentinel used for federated accounts never verifies as a password.
    pub async fn verify_credentials(&self, email: &str, password_hash: &str) -> Result<UserRecord> {
        let user = self
            .find_user_by_email(email)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if user.hashed_password == FEDERATED_LOGIN_SENTINEL
            || user.hashed_password != password_hash
        {
            return Err(Error::InvalidCredentials);
        }

        Ok(user)
    }

    /// Fetch a session owned by the user, creating it (titled from the first
    /// query) if it doesn't exist yet.
    pub async fn get_or_create_session(
        &self,
        session_id: &str,
        user_id: i64,
        query: &str,
    ) -> Result<SessionRecord> {
        let mut conn = self.pool.get_conn().await?;

        let row: Option<(String, i64, String, NaiveDateTime)> = conn
            .exec_first(
                "SELECT id, user_id, title, created_at FROM sessions \
                 WHERE id = :id AND user_id = :user_id",
                params! { "id" => session_id, "user_id" => user_id },
            )
            .await?;

        if let Some((id, user_id, title, created_at)) = row {
            return Ok(SessionRecord {
                id,
                user_id,
                title,
                created_at,
            });
        }

        let title = session_title(query);
        conn.exec_drop(
            "INSERT INTO sessions (id, user_id, title) VALUES (:id, :user_id, :title)",
            params! { "id" => session_id, "user_id" => user_id, "title" => &title },
        )
        .await?;

        debug!("Created session {} for user {}", session_id, user_id);

        let row: Option<(String, i64, String, NaiveDateTime)> = conn
            .exec_first(
                "SELECT id, user_id, title, created_at FROM sessions WHERE id = :id",
                params! { "id" => session_id },
            )
            .await?;

        row.map(|(id, user_id, title, created_at)| SessionRecord {
            id,
            user_id,
            title,
            created_at,
        })
        .ok_or_else(|| Error::Unknown("session vanished after insert".to_string()))
    }

    pub async fn append_message(&self, session_id: &str, role: &str, content: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "INSERT INTO messages (session_id, role, content) VALUES (:session_id, :role, :content)",
            params! { "session_id" => session_id, "role" => role, "content" => content },
        )
        .await?;
        Ok(())
    }

    /// Sessions for one user, newest first.
    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionRecord>> {
        let mut conn = self.pool.get_conn().await?;

        let rows: Vec<(String, i64, String, NaiveDateTime)> = conn
            .exec(
                "SELECT id, user_id, title, created_at FROM sessions \
                 WHERE user_id = :user_id ORDER BY created_at DESC",
                params! { "user_id" => user_id },
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, title, created_at)| SessionRecord {
                id,
                user_id,
                title,
                created_at,
            })
            .collect())
    }

    /// Messages for a session, ownership-checked, in timestamp order.
    pub async fn session_history(
        &self,
        session_id: &str,
        user_id: i64,
    ) -> Result<Vec<MessageRecord>> {
        let mut conn = self.pool.get_conn().await?;

        let owned: Option<String> = conn
            .exec_first(
                "SELECT id FROM sessions WHERE id = :id AND user_id = :user_id",
                params! { "id" => session_id, "user_id" => user_id },
            )
            .await?;

        if owned.is_none() {
            return Err(Error::NotFound(format!("session {}", session_id)));
        }

        let rows: Vec<(String, String, NaiveDateTime)> = conn
            .exec(
                "SELECT role, content, timestamp FROM messages \
                 WHERE session_id = :session_id ORDER BY timestamp ASC, id ASC",
                params! { "session_id" => session_id },
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(role, content, timestamp)| MessageRecord {
                role,
                content,
                timestamp,
            })
            .collect())
    }

    /// Delete one session owned by the user. Messages go with it.
    pub async fn delete_session(&self, session_id: &str, user_id: i64) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;

        conn.exec_drop(
            "DELETE FROM sessions WHERE id = :id AND user_id = :user_id",
            params! { "id" => session_id, "user_id" => user_id },
        )
        .await?;

        if conn.affected_rows() == 0 {
            return Err(Error::NotFound(format!("session {}", session_id)));
        }

        info!("Deleted session {}", session_id);
        Ok(())
    }

    /// Delete every session of one user (memory reset). Returns sessions removed.
    pub async fn delete_user_sessions(&self, user_id: i64) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;

        conn.exec_drop(
            "DELETE FROM sessions WHERE user_id = :user_id",
            params! { "user_id" => user_id },
        )
        .await?;

        let deleted = conn.affected_rows();
        info!("Deleted {} sessions for user {}", deleted, user_id);
        Ok(deleted)
    }

    /// Row totals across the three tables.
    pub async fn totals(&self) -> Result<StoreTotals> {
        let mut conn = self.pool.get_conn().await?;

        let users: u64 = conn
            .query_first("SELECT COUNT(*) FROM users")
            .await?
            .unwrap_or(0);
        let sessions: u64 = conn
            .query_first("SELECT COUNT(*) FROM sessions")
            .await?
            .unwrap_or(0);
        let messages: u64 = conn
            .query_first("SELECT COUNT(*) FROM messages")
            .await?
            .unwrap_or(0);

        Ok(StoreTotals {
            users,
            sessions,
            messages,
        })
    }
}

/// Title a new session with a prefix of its first query.
pub fn session_title(query: &str) -> String {
    let prefix: String = query.chars().take(TITLE_CHARS).collect();
    format!("{}...", prefix)
}

impl MessageRecord {
    /// Convert to a role-tagged prompt message (`user` / `model`).
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role.clone(), self.content.clone())
    }
}
