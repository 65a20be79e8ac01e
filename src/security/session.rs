//! Session lookup for authenticated endpoints.
//!
//! # Responsibilities
//! - Resolve the caller's session from request headers
//! - Resolve a user's role for admin-only endpoints
//!
//! The hosted auth service is a collaborator behind `SessionProvider`;
//! `TokenSessionStore` is the in-process stand-in.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderName};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

/// Platform roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Founder,
    Investor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Founder => "founder",
            Role::Investor => "investor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The session carried by these headers, if any is valid.
    async fn get_session(&self, headers: &HeaderMap) -> Option<Session>;

    async fn get_role(&self, user_id: &str) -> Option<Role>;
}

/// In-memory bearer-token sessions.
#[derive(Clone)]
pub struct TokenSessionStore {
    header: HeaderName,
    sessions: Arc<DashMap<String, Session>>,
    roles: Arc<DashMap<String, Role>>,
}

impl Default for TokenSessionStore {
    fn default() -> Self {
        Self::new(AUTHORIZATION)
    }
}

impl TokenSessionStore {
    /// Sessions read from `header`. For `authorization` the value must be
    /// `Bearer <token>`; any other header carries the raw token.
    pub fn new(header: HeaderName) -> Self {
        Self {
            header,
            sessions: Arc::new(DashMap::new()),
            roles: Arc::new(DashMap::new()),
        }
    }

    /// Create a session for `user_id` and return its token.
    pub fn issue(&self, user_id: &str, role: Role) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.insert(&token, user_id, role);
        token
    }

    /// Register a known token, replacing any previous holder.
    pub fn insert(&self, token: &str, user_id: &str, role: Role) {
        self.sessions.insert(
            token.to_string(),
            Session {
                user_id: user_id.to_string(),
                token: token.to_string(),
            },
        );
        self.roles.insert(user_id.to_string(), role);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    fn token_from<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let raw = headers.get(&self.header)?.to_str().ok()?.trim();
        let token = if self.header == AUTHORIZATION {
            raw.strip_prefix("Bearer ")?.trim()
        } else {
            raw
        };
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl SessionProvider for TokenSessionStore {
    async fn get_session(&self, headers: &HeaderMap) -> Option<Session> {
        let token = self.token_from(headers)?;
        self.sessions.get(token).map(|s| s.clone())
    }

    async fn get_role(&self, user_id: &str) -> Option<Role> {
        self.roles.get(user_id).map(|r| *r)
    }
}
