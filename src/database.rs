//! Database initialization, table definitions and the redb-backed store
//!
//! This module handles the setup of the embedded redb database and
//! implements [`Store`] on top of it. Records are stored as JSON strings.
//!
//! redb serialises write transactions, so every operation below that runs
//! inside a single `begin_write` .. `commit` is atomic with respect to all
//! other writers. Id assignment, uniqueness checks and click increments rely
//! on this.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;

use crate::model::{Link, LinkDraft, NewUser, RedirectHistory, User, Visit};
use crate::store::{Store, StoreError};

/// Users by id
///
/// Key: user id
/// Value: JSON-serialized [`User`]
pub const TABLE_USERS: TableDefinition<u64, &str> = TableDefinition::new("users_v1");

/// Unique index from email address to user id
pub const TABLE_USER_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("user_emails_v1");

/// Links by composite key
///
/// Key: `(user_id, link_id)`; link ids restart at 1 for every user
/// Value: JSON-serialized [`Link`]
///
/// Keys of one user are contiguous, so a range scan over
/// `(user_id, 0)..=(user_id, u64::MAX)` lists a user's links in id order
/// and its last entry holds the current maximum id.
pub const TABLE_LINKS: TableDefinition<(u64, u64), &str> = TableDefinition::new("links_v1");

/// Unique index from short code to the `(user_id, link_id)` it resolves to
pub const TABLE_SHORT_CODES: TableDefinition<&str, (u64, u64)> =
    TableDefinition::new("short_codes_v1");

/// Redirect history
///
/// Key: `(user_id, link_id, entry_id)`
/// Value: JSON-serialized [`RedirectHistory`]
pub const TABLE_REDIRECTS: TableDefinition<(u64, u64, u64), &str> =
    TableDefinition::new("redirects_v1");

/// Named counters; currently only the user id sequence
pub const TABLE_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences_v1");

const USER_SEQUENCE: &str = "users";

/// Initializes the embedded database and creates required tables
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "data.db")
///
/// # Example
///
/// ```no_run
/// # use byteurl::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_USERS)?;
        write_txn.open_table(TABLE_USER_EMAILS)?;
        write_txn.open_table(TABLE_LINKS)?;
        write_txn.open_table(TABLE_SHORT_CODES)?;
        write_txn.open_table(TABLE_REDIRECTS)?;
        write_txn.open_table(TABLE_SEQUENCES)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Opens the database, retrying a fixed number of times
///
/// Only startup retries; request-time store failures are reported, not
/// retried. A typical failure here is another process still holding the
/// file lock during a rolling restart.
pub async fn connect(
    db_path: &str,
    attempts: u32,
    retry_delay: Duration,
) -> Result<Database, redb::Error> {
    let mut attempt = 1;
    loop {
        match init_db(db_path) {
            Ok(db) => return Ok(db),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    error = %err,
                    "failed to open database, retrying"
                );
                attempt += 1;
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`Store`] implementation backed by redb
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

impl Store for RedbStore {
    fn user_exists(&self, email: &str) -> Result<bool, StoreError> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(TABLE_USER_EMAILS)?;
        let exists = emails.get(email)?.is_some();
        Ok(exists)
    }

    fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut emails = write_txn.open_table(TABLE_USER_EMAILS)?;
            if emails.get(user.email.as_str())?.is_some() {
                return Err(StoreError::DuplicateEmail);
            }

            let mut sequences = write_txn.open_table(TABLE_SEQUENCES)?;
            let id = sequences
                .get(USER_SEQUENCE)?
                .map_or(0, |current| current.value())
                + 1;
            sequences.insert(USER_SEQUENCE, id)?;

            let now = Utc::now();
            let record = User {
                id,
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                created_at: now,
                updated_at: now,
            };
            let json = serde_json::to_string(&record)?;

            write_txn
                .open_table(TABLE_USERS)?
                .insert(id, json.as_str())?;
            emails.insert(record.email.as_str(), id)?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(TABLE_USER_EMAILS)?;
        let Some(id) = emails.get(email)?.map(|guard| guard.value()) else {
            return Ok(None);
        };

        let users = read_txn.open_table(TABLE_USERS)?;
        let user = users.get(id)?.map(|guard| decode(guard.value())).transpose()?;
        Ok(user)
    }

    fn user_by_id(&self, id: u64) -> Result<Option<User>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(TABLE_USERS)?;
        let user = users.get(id)?.map(|guard| decode(guard.value())).transpose()?;
        Ok(user)
    }

    fn update_user_name(&self, id: u64, name: &str) -> Result<User, StoreError> {
        let write_txn = self.db.begin_write()?;
        let user = {
            let mut users = write_txn.open_table(TABLE_USERS)?;
            let mut user: User = match users.get(id)? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StoreError::NotFound),
            };
            user.name = name.to_string();
            user.updated_at = Utc::now();

            let json = serde_json::to_string(&user)?;
            users.insert(id, json.as_str())?;
            user
        };
        write_txn.commit()?;

        Ok(user)
    }

    fn list_links(&self, user_id: u64) -> Result<Vec<Link>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(TABLE_LINKS)?;

        let mut results = Vec::new();
        for entry in links.range((user_id, 0)..=(user_id, u64::MAX))? {
            let (_, value) = entry?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    fn insert_link(&self, user_id: u64, draft: LinkDraft) -> Result<Link, StoreError> {
        let write_txn = self.db.begin_write()?;
        let link = {
            let mut codes = write_txn.open_table(TABLE_SHORT_CODES)?;
            if codes.get(draft.shorten_url.as_str())?.is_some() {
                return Err(StoreError::ShortCodeTaken);
            }

            let mut links = write_txn.open_table(TABLE_LINKS)?;
            // Highest existing id of this user; the range is ordered by link id
            let id = match links.range((user_id, 0)..=(user_id, u64::MAX))?.next_back() {
                Some(entry) => entry?.0.value().1 + 1,
                None => 1,
            };

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
            let json = serde_json::to_string(&link)?;

            links.insert((user_id, id), json.as_str())?;
            codes.insert(link.shorten_url.as_str(), (user_id, id))?;
            link
        };
        write_txn.commit()?;

        Ok(link)
    }

    fn get_link(&self, user_id: u64, link_id: u64) -> Result<Option<Link>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(TABLE_LINKS)?;
        let link = links
            .get((user_id, link_id))?
            .map(|guard| decode(guard.value()))
            .transpose()?;
        Ok(link)
    }

    fn link_by_short_code(&self, code: &str) -> Result<Option<Link>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let codes = read_txn.open_table(TABLE_SHORT_CODES)?;
        let Some(key) = codes.get(code)?.map(|guard| guard.value()) else {
            return Ok(None);
        };

        let links = read_txn.open_table(TABLE_LINKS)?;
        let link = links.get(key)?.map(|guard| decode(guard.value())).transpose()?;
        Ok(link)
    }

    fn update_link(
        &self,
        user_id: u64,
        link_id: u64,
        title: &str,
        original_url: &str,
    ) -> Result<Link, StoreError> {
        let write_txn = self.db.begin_write()?;
        let link = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let mut link: Link = match links.get((user_id, link_id))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StoreError::NotFound),
            };
            link.title = title.to_string();
            link.original_url = original_url.to_string();
            link.updated_at = Utc::now();

            let json = serde_json::to_string(&link)?;
            links.insert((user_id, link_id), json.as_str())?;
            link
        };
        write_txn.commit()?;

        Ok(link)
    }

    fn delete_link(&self, user_id: u64, link_id: u64) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let link: Link = match links.remove((user_id, link_id))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StoreError::NotFound),
            };

            write_txn
                .open_table(TABLE_SHORT_CODES)?
                .remove(link.shorten_url.as_str())?;

            let mut redirects = write_txn.open_table(TABLE_REDIRECTS)?;
            let mut history_keys = Vec::new();
            for entry in redirects.range((user_id, link_id, 0)..=(user_id, link_id, u64::MAX))? {
                let (key, _) = entry?;
                history_keys.push(key.value());
            }
            for key in history_keys {
                redirects.remove(key)?;
            }
        }
        write_txn.commit()?;

        Ok(())
    }

    fn increment_clicks(&self, user_id: u64, link_id: u64) -> Result<Link, StoreError> {
        let write_txn = self.db.begin_write()?;
        let link = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let mut link: Link = match links.get((user_id, link_id))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StoreError::NotFound),
            };
            link.clicks += 1;

            let json = serde_json::to_string(&link)?;
            links.insert((user_id, link_id), json.as_str())?;
            link
        };
        write_txn.commit()?;

        Ok(link)
    }

    fn insert_redirect(
        &self,
        user_id: u64,
        link_id: u64,
        visit: Visit,
    ) -> Result<RedirectHistory, StoreError> {
        let write_txn = self.db.begin_write()?;
        let entry = {
            if write_txn
                .open_table(TABLE_LINKS)?
                .get((user_id, link_id))?
                .is_none()
            {
                return Err(StoreError::NotFound);
            }

            let mut redirects = write_txn.open_table(TABLE_REDIRECTS)?;
            let id = match redirects
                .range((user_id, link_id, 0)..=(user_id, link_id, u64::MAX))?
                .next_back()
            {
                Some(entry) => entry?.0.value().2 + 1,
                None => 1,
            };

            let entry = RedirectHistory {
                id,
                link_id,
                device: visit.device,
                browser: visit.browser,
                ip_address: visit.ip_address,
                location: visit.location,
                created_at: Utc::now(),
            };
            let json = serde_json::to_string(&entry)?;
            redirects.insert((user_id, link_id, id), json.as_str())?;
            entry
        };
        write_txn.commit()?;

        Ok(entry)
    }

    fn redirect_history(
        &self,
        user_id: u64,
        link_id: u64,
    ) -> Result<Vec<RedirectHistory>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let redirects = read_txn.open_table(TABLE_REDIRECTS)?;

        let mut results = Vec::new();
        for entry in redirects.range((user_id, link_id, 0)..=(user_id, link_id, u64::MAX))? {
            let (_, value) = entry?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }
}
