//! Account operations: signup, login and profile name changes

use std::sync::Arc;

use validator::Validate;

use crate::error::AppError;
use crate::model::{NewUser, User};
use crate::password::PasswordHasher;
use crate::store::Store;

#[derive(Validate)]
struct SignupInput {
    #[validate(length(min = 3, max = 32, message = "name must be between 3 and 32 characters"))]
    name: String,
    #[validate(email(message = "invalid email address"))]
    email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    password: String,
}

#[derive(Validate)]
struct LoginInput {
    #[validate(email(message = "invalid email address"))]
    email: String,
}

#[derive(Validate)]
struct NameInput {
    #[validate(length(min = 3, max = 32, message = "name must be between 3 and 32 characters"))]
    name: String,
}

/// Emails are matched case-insensitively
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn invalid_credentials() -> AppError {
    AppError::authentication("invalid email or password")
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
        }
    }

    /// Registers a new user
    ///
    /// Fails with a validation error on a short name or password or a bad
    /// email, and with a conflict when the email is already registered.
    pub fn signup(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let input = SignupInput {
            name: name.trim().to_string(),
            email: normalize_email(email),
            password: password.to_string(),
        };
        input.validate()?;

        if self.store.user_exists(&input.email)? {
            return Err(AppError::Conflict("user already exists".to_string()));
        }

        let password_hash = self.hasher.hash(&input.password)?;
        // The store re-checks the email inside its write transaction
        let user = self.store.create_user(NewUser {
            name: input.name,
            email: input.email,
            password_hash,
        })?;

        tracing::info!(user_id = user.id, "user signed up");
        Ok(user)
    }

    /// Checks credentials; unknown email and wrong password fail identically
    pub fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let input = LoginInput {
            email: normalize_email(email),
        };
        input.validate()?;

        let Some(user) = self.store.user_by_email(&input.email)? else {
            return Err(invalid_credentials());
        };
        if !self.hasher.verify(password, &user.password_hash)? {
            return Err(invalid_credentials());
        }

        tracing::debug!(user_id = user.id, "user logged in");
        Ok(user)
    }

    pub fn user(&self, id: u64) -> Result<User, AppError> {
        self.store
            .user_by_id(id)?
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    pub fn update_name(&self, id: u64, name: &str) -> Result<User, AppError> {
        let input = NameInput {
            name: name.trim().to_string(),
        };
        input.validate()?;

        let user = self.user(id)?;
        if user.name == input.name {
            return Err(AppError::validation("name is the same"));
        }

        Ok(self.store.update_user_name(id, &input.name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> AccountService {
        AccountService::new(Arc::new(MemoryStore::new()))
    }

    fn message(err: AppError) -> String {
        err.to_string()
    }

    #[test]
    fn signup_then_login() {
        let accounts = service();
        let user = accounts.signup("Ann", "Ann@X.com", "longenough1").unwrap();
        assert_eq!(user.email, "ann@x.com");
        assert_ne!(user.password_hash, "longenough1");

        let logged_in = accounts.login("ann@x.com", "longenough1").unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[test]
    fn signup_validation() {
        let accounts = service();

        let err = accounts.signup("An", "ann@x.com", "longenough1").unwrap_err();
        assert_eq!(message(err), "name must be between 3 and 32 characters");

        let err = accounts.signup("Ann", "not-an-email", "longenough1").unwrap_err();
        assert_eq!(message(err), "invalid email address");

        let err = accounts.signup("Ann", "ann@x.com", "short").unwrap_err();
        assert_eq!(message(err), "password must be at least 8 characters");
    }

    #[test]
    fn duplicate_signup_conflicts() {
        let accounts = service();
        accounts.signup("Ann", "ann@x.com", "longenough1").unwrap();

        let err = accounts.signup("Annie", "ANN@x.com", "longenough2").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn bad_credentials_do_not_reveal_which_part_failed() {
        let accounts = service();
        accounts.signup("Ann", "ann@x.com", "longenough1").unwrap();

        let wrong_password = accounts.login("ann@x.com", "wrongpassword").unwrap_err();
        let unknown_email = accounts.login("bob@x.com", "longenough1").unwrap_err();

        assert!(matches!(wrong_password, AppError::Authentication(_)));
        assert_eq!(message(wrong_password), message(unknown_email));
    }

    #[test]
    fn update_name_rules() {
        let accounts = service();
        let user = accounts.signup("Ann", "ann@x.com", "longenough1").unwrap();

        let err = accounts.update_name(user.id, "Ann").unwrap_err();
        assert_eq!(message(err), "name is the same");

        let err = accounts.update_name(user.id, &"x".repeat(33)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert_eq!(accounts.update_name(user.id, "Annabel").unwrap().name, "Annabel");
        assert!(matches!(
            accounts.update_name(999, "Nobody"),
            Err(AppError::NotFound(_))
        ));
    }
}
