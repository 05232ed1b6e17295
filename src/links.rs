//! Link lifecycle: creation with a unique short code, edits, deletion,
//! short-code resolution and visit accounting.
//!
//! All link access is scoped by the owning user; a link id belonging to
//! someone else behaves exactly like a missing one.

use std::borrow::Cow;
use std::sync::Arc;

use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::model::{Link, LinkDraft, LinkWithHistory, RedirectHistory, Visit};
use crate::shortcode::ShortCodeGenerator;
use crate::store::{Store, StoreError};

/// Fresh codes tried before giving up on a create
const MAX_CODE_ATTEMPTS: usize = 5;

fn web_scheme(url: &str) -> Result<(), ValidationError> {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::new("scheme")
            .with_message(Cow::Borrowed("originalUrl must use http or https")))
    }
}

#[derive(Validate)]
struct LinkInput {
    #[validate(length(min = 3, message = "title must be at least 3 characters"))]
    title: String,
    #[validate(
        length(min = 1, message = "originalUrl cannot be empty"),
        url(message = "invalid originalUrl"),
        custom(function = "web_scheme")
    )]
    original_url: String,
}

impl LinkInput {
    fn parse(title: &str, original_url: &str) -> Result<Self, AppError> {
        let input = Self {
            title: title.trim().to_string(),
            original_url: original_url.trim().to_string(),
        };
        input.validate()?;
        Ok(input)
    }
}

fn link_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::not_found("link not found"),
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct LinkService {
    store: Arc<dyn Store>,
    codes: ShortCodeGenerator,
}

impl LinkService {
    pub fn new(store: Arc<dyn Store>, codes: ShortCodeGenerator) -> Self {
        Self { store, codes }
    }

    /// Creates a link with a fresh short code and zero clicks
    ///
    /// A code already held by any link is regenerated, up to
    /// `MAX_CODE_ATTEMPTS` times.
    pub fn create(&self, user_id: u64, title: &str, original_url: &str) -> Result<Link, AppError> {
        let input = LinkInput::parse(title, original_url)?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let draft = LinkDraft {
                title: input.title.clone(),
                original_url: input.original_url.clone(),
                shorten_url: self.codes.generate(),
            };

            match self.store.insert_link(user_id, draft) {
                Ok(link) => {
                    tracing::info!(
                        user_id,
                        link_id = link.id,
                        code = %link.shorten_url,
                        "link created"
                    );
                    return Ok(link);
                }
                Err(StoreError::ShortCodeTaken) => {
                    tracing::warn!(user_id, attempt, "short code collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Internal(format!(
            "no free short code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }

    /// Replaces title and URL; the short code and click count are kept
    pub fn update(
        &self,
        user_id: u64,
        link_id: u64,
        title: &str,
        original_url: &str,
    ) -> Result<Link, AppError> {
        let input = LinkInput::parse(title, original_url)?;
        self.store
            .update_link(user_id, link_id, &input.title, &input.original_url)
            .map_err(link_error)
    }

    pub fn get(&self, user_id: u64, link_id: u64) -> Result<Link, AppError> {
        self.store
            .get_link(user_id, link_id)?
            .ok_or_else(|| AppError::not_found("link not found"))
    }

    pub fn list(&self, user_id: u64) -> Result<Vec<Link>, AppError> {
        Ok(self.store.list_links(user_id)?)
    }

    pub fn list_with_history(&self, user_id: u64) -> Result<Vec<LinkWithHistory>, AppError> {
        self.store
            .list_links(user_id)?
            .into_iter()
            .map(|link| {
                let redirect_history = self.store.redirect_history(user_id, link.id)?;
                Ok(LinkWithHistory {
                    link,
                    redirect_history,
                })
            })
            .collect()
    }

    /// Removes the link together with its redirect history
    pub fn delete(&self, user_id: u64, link_id: u64) -> Result<(), AppError> {
        self.store.delete_link(user_id, link_id).map_err(link_error)?;
        tracing::info!(user_id, link_id, "link deleted");
        Ok(())
    }

    /// Finds the link behind a short code, whoever owns it
    pub fn resolve(&self, code: &str) -> Result<Link, AppError> {
        self.store
            .link_by_short_code(code)?
            .ok_or_else(|| AppError::not_found("short link not found"))
    }

    /// Counts one visit; concurrent calls never lose an increment
    pub fn record_click(&self, link: &Link) -> Result<Link, AppError> {
        self.store
            .increment_clicks(link.user_id, link.id)
            .map_err(link_error)
    }

    pub fn record_redirect_history(
        &self,
        link: &Link,
        visit: Visit,
    ) -> Result<RedirectHistory, AppError> {
        self.store
            .insert_redirect(link.user_id, link.id, visit)
            .map_err(link_error)
    }
}
