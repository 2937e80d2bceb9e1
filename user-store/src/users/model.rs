//! User management entities and request/response shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::query::{FilterDescriptor, FilterField, FilterOperator, Query};
use crate::repository::{Entity, EntityMeta, Relation};

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role_id: Uuid,
    #[serde(default)]
    pub is_verified: bool,
    /// Preloaded with the `role` relation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Preloaded with the `password` relation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<UserPassword>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const NAME: &'static str = "User";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn relations() -> &'static [Relation] {
        const RELATIONS: &[Relation] = &[
            Relation::one("role", "roles", "role_id", "role_id"),
            Relation::one("password", "user_passwords", "user_id", "user_id"),
        ];
        RELATIONS
    }
}

/// Role a user is assigned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub role_id: Uuid,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl Entity for Role {
    const TABLE: &'static str = "roles";
    const NAME: &'static str = "Role";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

/// Login password of a user, one row per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPassword {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub user_password_id: Uuid,
    pub password: String,
    pub user_id: Uuid,
}

impl Entity for UserPassword {
    const TABLE: &'static str = "user_passwords";
    const NAME: &'static str = "UserPassword";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

fn alphabetic(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("alpha"))
    }
}

fn numeric(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("numeric"))
    }
}

fn required_uuid(value: &Uuid) -> Result<(), ValidationError> {
    if value.is_nil() {
        Err(ValidationError::new("required"))
    } else {
        Ok(())
    }
}

/// Registration and full-update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UserRequest {
    #[validate(length(min = 2, max = 50), custom(function = "alphabetic"))]
    pub first_name: String,

    #[validate(length(min = 2, max = 50), custom(function = "alphabetic"))]
    pub last_name: String,

    #[validate(email)]
    pub email: String,

    /// Ten digits, no separators
    #[validate(length(equal = 10), custom(function = "numeric"))]
    pub phone: String,

    #[validate(custom(function = "required_uuid"))]
    pub role_id: Uuid,
}

/// Credentials submitted to log in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Login {
    /// Registered email address
    #[validate(email)]
    pub user_name: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// Filters accepted when listing users
///
/// Names match as case-insensitive substrings; the other fields match
/// exactly. `is_verified` is a plain boolean, so it always applies.
/// `is_deleted = Some(true)` needs the query from [`UserQueryParams::scope`],
/// since soft-deleted rows are otherwise hidden.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserQueryParams {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub is_verified: bool,
}

impl FilterDescriptor for UserQueryParams {
    fn filter_fields(&self) -> Vec<FilterField> {
        vec![
            FilterField::tagged("first_name", "ILIKE", self.first_name.clone()),
            FilterField::tagged("last_name", "ILIKE", self.last_name.clone()),
            FilterField::optional("email", FilterOperator::Equal, self.email.clone()),
            FilterField::optional("phone", FilterOperator::Equal, self.phone.clone()),
            FilterField::optional("role_id", FilterOperator::Equal, self.role_id),
            FilterField::optional("is_deleted", FilterOperator::Equal, self.is_deleted),
            FilterField::new("is_verified", FilterOperator::Equal, self.is_verified),
        ]
    }
}

impl UserQueryParams {
    /// Lift the soft-delete scope from `query` when deleted users are asked for
    pub fn scope(&self, query: Query) -> Query {
        if self.is_deleted == Some(true) {
            query.unscoped()
        } else {
            query
        }
    }
}

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub first_name: String,
    pub full_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role_id: Uuid,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            first_name: user.first_name.clone(),
            full_name: user.full_name(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role_id: user.role_id,
        }
    }
}

/// Successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_details: UserResponse,
    pub authorization_token: String,
    pub expiry: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_query, Condition, Predicate};

    fn request() -> UserRequest {
        UserRequest {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@example.com".into(),
            phone: "5551234567".into(),
            role_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_invalid_requests() {
        let cases = [
            UserRequest { first_name: "J".into(), ..request() },
            UserRequest { last_name: "D0e".into(), ..request() },
            UserRequest { email: "not-an-email".into(), ..request() },
            UserRequest { phone: "555-123-45".into(), ..request() },
            UserRequest { phone: "55512345678".into(), ..request() },
            UserRequest { role_id: Uuid::nil(), ..request() },
        ];
        for case in cases {
            assert!(case.validate().is_err(), "{:?} should be rejected", case);
        }
    }

    #[test]
    fn test_query_params_apply_only_provided_fields() {
        let params = UserQueryParams {
            first_name: Some("ja".into()),
            is_verified: true,
            ..Default::default()
        };
        let query = build_query(Query::new(), &params);
        assert_eq!(
            query.conditions(),
            &[
                Condition::from(Predicate::ilike("first_name", "%ja%")),
                Condition::from(Predicate::eq("is_verified", true)),
            ]
        );
    }

    #[test]
    fn test_query_params_false_boolean_still_applies() {
        let params = UserQueryParams {
            is_deleted: Some(false),
            ..Default::default()
        };
        let query = build_query(Query::new(), &params);
        assert_eq!(query.conditions().len(), 2);
    }

    #[test]
    fn test_query_params_scope_follows_is_deleted() {
        let deleted = UserQueryParams {
            is_deleted: Some(true),
            ..Default::default()
        };
        assert!(deleted.scope(Query::new()).is_unscoped());

        let live = UserQueryParams {
            is_deleted: Some(false),
            ..Default::default()
        };
        assert!(!live.scope(Query::new()).is_unscoped());
        assert!(!UserQueryParams::default().scope(Query::new()).is_unscoped());
    }

    #[test]
    fn test_response_has_full_name() {
        let user = User {
            meta: EntityMeta::default(),
            user_id: Uuid::new_v4(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@example.com".into(),
            phone: "5551234567".into(),
            role_id: Uuid::new_v4(),
            is_verified: true,
            role: None,
            password: None,
        };
        let response = UserResponse::from(&user);
        assert_eq!(response.full_name, "Jane Doe");
        assert_eq!(response.user_id, user.user_id);
    }

    #[test]
    fn test_relations_are_declared() {
        assert!(User::relation("role").is_some());
        assert!(User::relation("password").is_some());
        assert!(User::relation("address").is_none());
    }
}
