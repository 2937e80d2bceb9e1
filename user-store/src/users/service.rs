//! Registration, verification, login and profile management

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::model::{User, UserPassword, UserQueryParams, UserRequest, UserResponse};
use super::notify::{Email, Notifier};
use crate::auth::{generate_otp, generate_password};
use crate::cache::Cache;
use crate::config::{Config, OtpConfig};
use crate::error::{Error, Result};
use crate::query::{build_query, Predicate};
use crate::rate_limit::RateLimiter;
use crate::repository::{
    BaseRepository, EntityMeta, RepositoryErrorKind, Row, Transactional,
};

#[cfg(feature = "jwt")]
use super::model::{Login, LoginResponse};
#[cfg(feature = "jwt")]
use crate::auth::JwtIssuer;
#[cfg(feature = "jwt")]
use crate::query::Query;

const REGISTERED_MESSAGE: &str =
    "Please verify your Email Address. We have sent an OTP to the Email Address.";
const VERIFIED_MESSAGE: &str = "Your email has been successfully verified! We've sent your login \
     credentials to your registered email address. Please check your inbox to proceed.";
const RESENT_MESSAGE: &str = "We have sent the OTP to your Email address.";

fn parse_user_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| Error::BadRequest("invalid id format, expects uuid".into()))
}

fn duplicate_email(err: Error, email: &str) -> Error {
    match err {
        Error::Repository(e) if e.kind == RepositoryErrorKind::AlreadyExists => {
            Error::Conflict(format!("user with email ({}) is already registered", email))
        }
        other => other,
    }
}

/// User management over a repository, a cache for one-time codes and an
/// email [`Notifier`]
///
/// Email delivery is best-effort: failures are logged and do not fail the
/// operation that triggered them.
pub struct UserService<S, C, N> {
    users: BaseRepository<User, S, C>,
    cache: C,
    notifier: N,
    otp: OtpConfig,
    company: String,
    limiter: Option<RateLimiter<C>>,
    #[cfg(feature = "jwt")]
    tokens: JwtIssuer,
}

impl<S, C, N> UserService<S, C, N>
where
    S: Transactional,
    C: Cache,
    N: Notifier,
{
    /// Build the service from configuration
    ///
    /// With the `jwt` feature this fails when no JWT secret is configured.
    pub fn new(store: S, cache: C, notifier: N, config: &Config) -> Result<Self> {
        Ok(Self {
            users: BaseRepository::new(store, cache.clone()).with_cache_ttl(config.cache.ttl()),
            cache,
            notifier,
            otp: config.otp.clone(),
            company: config.service.name.clone(),
            limiter: None,
            #[cfg(feature = "jwt")]
            tokens: JwtIssuer::new(&config.jwt)?,
        })
    }

    /// Limit registrations per email address
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter<C>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// The user repository
    pub fn users(&self) -> &BaseRepository<User, S, C> {
        &self.users
    }

    async fn notify(&self, email: Email) {
        let to = email.to.clone();
        if let Err(e) = self.notifier.send(email).await {
            warn!(to = %to, error = %e, "Failed to send email");
        }
    }

    async fn send_verification_code(&self, user: &User) -> Result<()> {
        let code = generate_otp(self.otp.length);
        self.cache.set(&user.email, &code, self.otp.expiry()).await?;
        self.notify(Email::verification_code(
            &user.email,
            &user.full_name(),
            &self.company,
            &code,
            self.otp.expiry_minutes,
        ))
        .await;
        Ok(())
    }

    /// Register a new, unverified user and email them a verification code
    ///
    /// The user and their generated password are stored in one transaction.
    pub async fn register(&self, request: UserRequest) -> Result<String> {
        request.validate()?;
        if let Some(limiter) = &self.limiter {
            limiter.enforce(&request.email).await?;
        }

        let email = request.email.clone();
        let user = User {
            meta: EntityMeta::default(),
            user_id: Uuid::new_v4(),
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone: request.phone,
            role_id: request.role_id,
            is_verified: false,
            role: None,
            password: None,
        };
        let password = generate_password(self.otp.password_length);

        let user = self
            .users
            .with_transaction(|tx| async move {
                let mut user = user;
                tx.create(&mut user).await?;

                let mut credential = UserPassword {
                    meta: EntityMeta::default(),
                    user_password_id: Uuid::new_v4(),
                    password,
                    user_id: user.user_id,
                };
                tx.for_entity::<UserPassword>()
                    .create(&mut credential)
                    .await?;
                Ok::<_, Error>(user)
            })
            .await
            .map_err(|e| duplicate_email(e, &email))?;

        info!(user_id = %user.user_id, "User registered");
        self.send_verification_code(&user).await?;
        Ok(REGISTERED_MESSAGE.to_string())
    }

    /// Confirm an email address with the code sent to it
    ///
    /// Spaces in `otp` are ignored. On success the code is discarded and the
    /// user's credentials are emailed.
    pub async fn verify_email(&self, email: &str, otp: &str) -> Result<String> {
        let user = self
            .users
            .get_by_condition(Predicate::eq("email", email))
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("user with email ({}) is not registered", email))
            })?;

        if user.is_verified {
            return Err(Error::Conflict(format!(
                "user with email ({}) is already verified, you can proceed to login",
                email
            )));
        }

        let cached = self
            .cache
            .get(email)
            .await?
            .ok_or_else(|| Error::BadRequest("the OTP you entered is expired".into()))?;
        let otp: String = otp.chars().filter(|c| *c != ' ').collect();
        if cached != otp {
            return Err(Error::BadRequest(
                "the OTP you entered is incorrect. Please check and try again".into(),
            ));
        }

        let mut fields = Row::new();
        fields.insert("is_verified".into(), true.into());
        self.users
            .update_specific_record(
                fields,
                vec![
                    Predicate::eq("email", email),
                    Predicate::eq("is_verified", false),
                ],
            )
            .await?;

        let verified = self
            .users
            .find_all_by_condition_with_join(
                &["password", "role"],
                None,
                vec![
                    Predicate::eq("email", email),
                    Predicate::eq("is_verified", true),
                ],
            )
            .await?;
        let user = verified
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound("user details not found".into()))?;
        let password = user
            .password
            .as_ref()
            .ok_or_else(|| Error::NotFound("user details not found".into()))?;

        self.cache.delete(&[email]).await?;
        info!(user_id = %user.user_id, "Email verified");

        self.notify(Email::credentials(
            &user.email,
            &user.full_name(),
            &self.company,
            &user.email,
            &password.password,
        ))
        .await;
        Ok(VERIFIED_MESSAGE.to_string())
    }

    /// Issue a fresh verification code to an unverified user
    ///
    /// Unknown emails are `NotFound`. A user who already verified gets
    /// `Conflict` pointing them to login rather than a "not registered"
    /// answer, and no code is issued.
    pub async fn resend_verification_code(&self, email: &str) -> Result<String> {
        let user = self
            .users
            .get_by_condition(Predicate::eq("email", email))
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("the user with email ({}) has not registered", email))
            })?;

        if user.is_verified {
            return Err(Error::Conflict(format!(
                "user with email ({}) is already verified, you can proceed to login",
                email
            )));
        }

        self.send_verification_code(&user).await?;
        Ok(RESENT_MESSAGE.to_string())
    }

    /// Authenticate a verified user and issue a session token
    #[cfg(feature = "jwt")]
    pub async fn login(&self, login: &Login) -> Result<LoginResponse> {
        login.validate()?;

        let candidates = self
            .users
            .preload_relations(
                Some(Query::new().filter(vec![
                    Predicate::eq("email", login.user_name.as_str()),
                    Predicate::eq("is_verified", true),
                ])),
                &["password", "role"],
            )
            .await?;

        let user = candidates
            .into_iter()
            .find(|user| {
                user.password
                    .as_ref()
                    .is_some_and(|p| p.password == login.password)
            })
            .ok_or_else(|| {
                warn!("Rejected login attempt");
                Error::Unauthorized("invalid User credentials".into())
            })?;

        let user_details = UserResponse::from(&user);
        let issued = self.tokens.issue(&user_details)?;
        debug!(user_id = %user.user_id, "Issued session token");

        Ok(LoginResponse {
            user_details,
            authorization_token: issued.token,
            expiry: issued.expires_at,
        })
    }

    /// A verified, live user by their uuid
    pub async fn get_user(&self, id: &str) -> Result<UserResponse> {
        let user_id = parse_user_id(id)?;
        let user = self
            .users
            .get_by_condition(vec![
                Predicate::eq("user_id", user_id),
                Predicate::eq("is_verified", true),
            ])
            .await?
            .ok_or_else(|| Error::NotFound(format!("no user found with id = {}", user_id)))?;
        Ok(UserResponse::from(&user))
    }

    /// Verified users matching `params`, ordered by id
    ///
    /// Soft-deleted users are listed only when `params.is_deleted` is
    /// `Some(true)`.
    pub async fn list_users(&self, mut params: UserQueryParams) -> Result<Vec<UserResponse>> {
        params.is_verified = true;
        let query = build_query(params.scope(self.users.query()), &params);

        let (users, _) = self.users.find_all(Some(query), "id", 0, 0).await?;
        if users.is_empty() {
            return Err(Error::NotFound("no data found".into()));
        }
        Ok(users.iter().map(UserResponse::from).collect())
    }

    /// Overwrite the profile of a verified, live user
    pub async fn update_user(&self, id: &str, request: UserRequest) -> Result<UserResponse> {
        let user_id = parse_user_id(id)?;
        request.validate()?;

        let mut user = self
            .users
            .find_all_by_condition(vec![
                Predicate::eq("user_id", user_id),
                Predicate::eq("is_verified", true),
            ])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no user found with id = {}", user_id)))?;

        let email = request.email.clone();
        user.first_name = request.first_name;
        user.last_name = request.last_name;
        user.email = request.email;
        user.phone = request.phone;
        user.role_id = request.role_id;

        self.users
            .update(&mut user)
            .await
            .map_err(|e| duplicate_email(e.into(), &email))?;
        info!(user_id = %user.user_id, "User updated");
        Ok(UserResponse::from(&user))
    }
}
