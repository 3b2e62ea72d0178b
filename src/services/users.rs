use crate::error::PayError;
use crate::models::{NewUser, User, UserId};
use crate::services::store::{self, Store};

/// Directory of registered users. Sender and approver names shown on
/// payments are copied from here.
#[derive(Clone)]
pub struct UserDirectory {
    store: Store,
}

impl UserDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewUser) -> Result<User, PayError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(PayError::validation("name is required"));
        }
        if let Some(email) = &new.email {
            if !email.contains('@') {
                return Err(PayError::Validation(format!("invalid email {}", email)));
            }
        }

        let mut conn = self.store.pool().acquire().await?;
        let user = store::insert_user(&mut conn, &new).await?;
        tracing::info!(user_id = user.id, name = %user.name, "User registered");
        Ok(user)
    }

    pub async fn get(&self, id: UserId) -> Result<User, PayError> {
        let mut conn = self.store.pool().acquire().await?;
        store::fetch_user(&mut conn, id)
            .await?
            .ok_or_else(|| PayError::NotFound(format!("user {}", id)))
    }
}
