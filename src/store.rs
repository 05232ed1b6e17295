//! Credential store abstraction
//!
//! [`Store`] is the capability set the rest of the application needs from
//! persistence. [`crate::database::RedbStore`] implements it on the embedded
//! database; [`MemoryStore`] implements it in memory for tests.
//!
//! Every mutating operation is atomic: id assignment (`max + 1` within the
//! owner), uniqueness checks and click increments happen inside one
//! critical section, so concurrent callers never observe or produce a torn
//! state.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::model::{Link, LinkDraft, NewUser, RedirectHistory, User, Visit};

#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched the lookup or mutation
    #[error("record not found")]
    NotFound,

    #[error("email is already registered")]
    DuplicateEmail,

    /// The generated short code already maps to another link
    #[error("short code is already in use")]
    ShortCodeTaken,

    #[error("storage backend failure: {0}")]
    Backend(#[from] redb::Error),

    #[error("record encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

macro_rules! from_redb {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for StoreError {
                fn from(err: $err) -> Self {
                    StoreError::Backend(err.into())
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Persistence operations required by the account and link services
pub trait Store: Send + Sync {
    fn user_exists(&self, email: &str) -> Result<bool, StoreError>;

    /// Inserts a user with the next id; fails with
    /// [`StoreError::DuplicateEmail`] when the email is taken
    fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    fn user_by_id(&self, id: u64) -> Result<Option<User>, StoreError>;

    fn update_user_name(&self, id: u64, name: &str) -> Result<User, StoreError>;

    /// All links of a user, ordered by link id
    fn list_links(&self, user_id: u64) -> Result<Vec<Link>, StoreError>;

    /// Inserts a link with `id = max(existing ids of user_id) + 1` and zero
    /// clicks; fails with [`StoreError::ShortCodeTaken`] on a code collision
    fn insert_link(&self, user_id: u64, draft: LinkDraft) -> Result<Link, StoreError>;

    fn get_link(&self, user_id: u64, link_id: u64) -> Result<Option<Link>, StoreError>;

    /// The only lookup not scoped by owner
    fn link_by_short_code(&self, code: &str) -> Result<Option<Link>, StoreError>;

    /// Replaces title and original URL; clicks and short code are kept
    fn update_link(
        &self,
        user_id: u64,
        link_id: u64,
        title: &str,
        original_url: &str,
    ) -> Result<Link, StoreError>;

    /// Removes the link, its short code and its redirect history
    fn delete_link(&self, user_id: u64, link_id: u64) -> Result<(), StoreError>;

    /// Adds one to the stored click counter and returns the updated link
    fn increment_clicks(&self, user_id: u64, link_id: u64) -> Result<Link, StoreError>;

    /// Appends a visit with `id = max(existing ids of the link) + 1`
    fn insert_redirect(
        &self,
        user_id: u64,
        link_id: u64,
        visit: Visit,
    ) -> Result<RedirectHistory, StoreError>;

    fn redirect_history(
        &self,
        user_id: u64,
        link_id: u64,
    ) -> Result<Vec<RedirectHistory>, StoreError>;
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<u64, User>,
    emails: BTreeMap<String, u64>,
    links: BTreeMap<(u64, u64), Link>,
    short_codes: BTreeMap<String, (u64, u64)>,
    redirects: BTreeMap<(u64, u64, u64), RedirectHistory>,
    next_user_id: u64,
}

/// In-memory [`Store`] guarded by a single lock
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn user_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().emails.contains_key(email))
    }

    fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock();
        if tables.emails.contains_key(&user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let record = User {
            id: tables.next_user_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        tables.emails.insert(record.email.clone(), record.id);
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    fn user_by_id(&self, id: u64) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    fn update_user_name(&self, id: u64, name: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.lock();
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.name = name.to_string();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    fn list_links(&self, user_id: u64) -> Result<Vec<Link>, StoreError> {
        Ok(self
            .tables
            .lock()
            .links
            .range((user_id, 0)..=(user_id, u64::MAX))
            .map(|(_, link)| link.clone())
            .collect())
    }

    fn insert_link(&self, user_id: u64, draft: LinkDraft) -> Result<Link, StoreError> {
        let mut tables = self.tables.lock();
        if tables.short_codes.contains_key(&draft.shorten_url) {
            return Err(StoreError::ShortCodeTaken);
        }

        let id = tables
            .links
            .range((user_id, 0)..=(user_id, u64::MAX))
            .next_back()
            .map_or(1, |((_, id), _)| id + 1);

        let now = Utc::now();
        let link = Link {
            id,
            user_id,
            title: draft.title,
            original_url: draft.original_url,
            shorten_url: draft.shorten_url,
            clicks: 0,
            created_at: now,
            updated_at: now,
        };
        tables
            .short_codes
            .insert(link.shorten_url.clone(), (user_id, id));
        tables.links.insert((user_id, id), link.clone());
        Ok(link)
    }

    fn get_link(&self, user_id: u64, link_id: u64) -> Result<Option<Link>, StoreError> {
        Ok(self.tables.lock().links.get(&(user_id, link_id)).cloned())
    }

    fn link_by_short_code(&self, code: &str) -> Result<Option<Link>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .short_codes
            .get(code)
            .and_then(|key| tables.links.get(key))
            .cloned())
    }

    fn update_link(
        &self,
        user_id: u64,
        link_id: u64,
        title: &str,
        original_url: &str,
    ) -> Result<Link, StoreError> {
        let mut tables = self.tables.lock();
        let link = tables
            .links
            .get_mut(&(user_id, link_id))
            .ok_or(StoreError::NotFound)?;
        link.title = title.to_string();
        link.original_url = original_url.to_string();
        link.updated_at = Utc::now();
        Ok(link.clone())
    }

    fn delete_link(&self, user_id: u64, link_id: u64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let link = tables
            .links
            .remove(&(user_id, link_id))
            .ok_or(StoreError::NotFound)?;
        tables.short_codes.remove(&link.shorten_url);
        tables
            .redirects
            .retain(|&(owner, id, _), _| (owner, id) != (user_id, link_id));
        Ok(())
    }

    fn increment_clicks(&self, user_id: u64, link_id: u64) -> Result<Link, StoreError> {
        let mut tables = self.tables.lock();
        let link = tables
            .links
            .get_mut(&(user_id, link_id))
            .ok_or(StoreError::NotFound)?;
        link.clicks += 1;
        Ok(link.clone())
    }

    fn insert_redirect(
        &self,
        user_id: u64,
        link_id: u64,
        visit: Visit,
    ) -> Result<RedirectHistory, StoreError> {
        let mut tables = self.tables.lock();
        if !tables.links.contains_key(&(user_id, link_id)) {
            return Err(StoreError::NotFound);
        }

        let id = tables
            .redirects
            .range((user_id, link_id, 0)..=(user_id, link_id, u64::MAX))
            .next_back()
            .map_or(1, |((_, _, id), _)| id + 1);

        let entry = RedirectHistory {
            id,
            link_id,
            device: visit.device,
            browser: visit.browser,
            ip_address: visit.ip_address,
            location: visit.location,
            created_at: Utc::now(),
        };
        tables
            .redirects
            .insert((user_id, link_id, id), entry.clone());
        Ok(entry)
    }

    fn redirect_history(
        &self,
        user_id: u64,
        link_id: u64,
    ) -> Result<Vec<RedirectHistory>, StoreError> {
        Ok(self
            .tables
            .lock()
            .redirects
            .range((user_id, link_id, 0)..=(user_id, link_id, u64::MAX))
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}
