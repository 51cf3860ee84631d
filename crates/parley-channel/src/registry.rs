//! Connected identities, indexed by connection, name and session.
//!
//! The connection map owns every [`ChatUser`]; the name and session maps are
//! derived lookup tables pointing back at a connection id. All three are
//! only touched together, after every conflict check has passed, so a
//! failed operation leaves them exactly as they were.

use std::collections::HashMap;

use parley_core::{ConnectionId, SessionToken};

use crate::errors::RegistryError;

/// One identified user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatUser {
    /// Connection the user is on.
    pub connection: ConnectionId,
    /// Session the user claimed.
    pub session: SessionToken,
    /// Display name; unique ignoring case.
    pub name: String,
}

/// Exactly one key kind per lookup.
#[derive(Clone, Copy, Debug)]
pub enum Lookup<'a> {
    /// Case-insensitive display name.
    Name(&'a str),
    /// By session token.
    Session(&'a SessionToken),
    /// By connection id.
    Connection(ConnectionId),
}

/// Fields to change in [`UserRegistry::update`]. `None` keeps the current value.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    /// New display name.
    pub name: Option<String>,
    /// New session token.
    pub session: Option<SessionToken>,
}

impl UserPatch {
    /// Patch that only renames.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            session: None,
        }
    }
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Identified users, indexed by connection, name, and session.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: HashMap<ConnectionId, ChatUser>,
    by_name: HashMap<String, ConnectionId>,
    by_session: HashMap<SessionToken, ConnectionId>,
}

impl UserRegistry {
    /// Registry with no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user. Fails without side effects if any key is held.
    pub fn create(&mut self, user: ChatUser) -> Result<(), RegistryError> {
        if self.users.contains_key(&user.connection) {
            return Err(RegistryError::ConnectionConflict(user.connection));
        }
        if self.by_name.contains_key(&name_key(&user.name)) {
            return Err(RegistryError::NameConflict(user.name));
        }
        if self.by_session.contains_key(&user.session) {
            return Err(RegistryError::SessionConflict(user.session));
        }
        self.index(&user);
        let _ = self.users.insert(user.connection, user);
        Ok(())
    }

    /// Look a user up by one key.
    pub fn find(&self, lookup: Lookup<'_>) -> Option<&ChatUser> {
        let connection = match lookup {
            Lookup::Connection(id) => id,
            Lookup::Name(name) => *self.by_name.get(&name_key(name))?,
            Lookup::Session(session) => *self.by_session.get(session)?,
        };
        self.users.get(&connection)
    }

    /// Remove the user on `connection` from every index.
    pub fn delete(&mut self, connection: ConnectionId) -> Result<ChatUser, RegistryError> {
        let user = self
            .users
            .remove(&connection)
            .ok_or(RegistryError::NotFound(connection))?;
        self.unindex(&user);
        Ok(user)
    }

    /// Replace fields of an existing user in one step.
    ///
    /// Conflicts are checked against every other user before anything
    /// changes; a user never conflicts with itself, so a case-only rename
    /// succeeds.
    pub fn update(
        &mut self,
        connection: ConnectionId,
        patch: UserPatch,
    ) -> Result<&ChatUser, RegistryError> {
        let current = self
            .users
            .get(&connection)
            .ok_or(RegistryError::NotFound(connection))?;

        let next = ChatUser {
            connection,
            name: patch.name.unwrap_or_else(|| current.name.clone()),
            session: patch.session.unwrap_or_else(|| current.session.clone()),
        };

        if let Some(holder) = self.by_name.get(&name_key(&next.name)) {
            if *holder != connection {
                return Err(RegistryError::NameConflict(next.name));
            }
        }
        if let Some(holder) = self.by_session.get(&next.session) {
            if *holder != connection {
                return Err(RegistryError::SessionConflict(next.session));
            }
        }

        let previous = current.clone();
        self.unindex(&previous);
        self.index(&next);
        let _ = self.users.insert(connection, next);
        self.users
            .get(&connection)
            .ok_or(RegistryError::NotFound(connection))
    }

    /// Display names, sorted case-insensitively.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.values().map(|u| u.name.clone()).collect();
        names.sort_by_cached_key(|n| (n.to_lowercase(), n.clone()));
        names
    }

    /// Number of identified users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody has identified.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn index(&mut self, user: &ChatUser) {
        let _ = self.by_name.insert(name_key(&user.name), user.connection);
        let _ = self.by_session.insert(user.session.clone(), user.connection);
    }

    fn unindex(&mut self, user: &ChatUser) {
        let _ = self.by_name.remove(&name_key(&user.name));
        let _ = self.by_session.remove(&user.session);
    }

    #[cfg(test)]
    fn consistent(&self) -> bool {
        self.by_name.len() == self.users.len()
            && self.by_session.len() == self.users.len()
            && self.users.iter().all(|(id, u)| {
                u.connection == *id
                    && self.by_name.get(&name_key(&u.name)) == Some(id)
                    && self.by_session.get(&u.session) == Some(id)
            })
    }
}
