//! User management built on the generic repository
//!
//! [`UserService`] covers registration with emailed one-time codes, email
//! verification, login, lookup, listing with dynamic filters and profile
//! updates.

pub mod model;
pub mod notify;
pub mod service;

pub use model::{
    Login, LoginResponse, Role, User, UserPassword, UserQueryParams, UserRequest, UserResponse,
};
pub use notify::{Email, LogNotifier, Notifier};
pub use service::UserService;
