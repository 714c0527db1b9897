use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::{Preferences, Role, UserProfile};

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                           // unique user ID
    pub username: String,                   // unique login name
    pub email: String,                      // unique, stored lowercase
    #[serde(skip_serializing)]
    pub password_hash: String,              // Argon2 hash, not exposed in JSON
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<Date>,
    pub role: String,                       // user | admin | moderator
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: OffsetDateTime,         // creation timestamp
    pub updated_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

/// Fields required to insert a user.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub date_of_birth: Option<Date>,
}

impl User {
    /// Unknown role strings degrade to the least privileged role.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_default()
    }

    pub fn to_profile(&self, preferences: Option<Preferences>) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            phone_number: self.phone_number.clone(),
            date_of_birth: self.date_of_birth,
            role: self.role(),
            is_active: self.is_active,
            is_verified: self.is_verified,
            created_at: self.created_at,
            last_login: self.last_login,
            preferences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "asha".into(),
            email: "asha@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            full_name: Some("Asha Rao".into()),
            phone_number: None,
            date_of_birth: None,
            role: role.into(),
            is_active: true,
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            last_login: None,
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_string(&sample("user")).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn unknown_role_falls_back_to_user() {
        assert_eq!(sample("admin").role(), Role::Admin);
        assert_eq!(sample("superuser").role(), Role::User);
    }

    #[test]
    fn profile_copies_public_fields() {
        let user = sample("moderator");
        let profile = user.to_profile(Some(Preferences::default()));
        assert_eq!(profile.id, user.id);
        assert_eq!(profile.full_name.as_deref(), Some("Asha Rao"));
        assert_eq!(profile.role, Role::Moderator);
        assert!(profile.preferences.is_some());
    }
}
