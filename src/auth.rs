use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::error::BlockingError;
use actix_web::http::header::Header;
use actix_web::{web, HttpMessage, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header as TokenHeader, Validation,
};
use serde::{Deserialize, Serialize};

use crate::config::Context;
use crate::errors::JobStoreError;

pub const SESSION_COOKIE: &str = "jobstore_session";
const ISSUER: &str = "jobstore";

/// Longest lifetime a session token can be issued with, one hundred years.
pub const MAX_SESSION_HOURS: i64 = 24 * 365 * 100;

/// bcrypt only looks at the first 72 bytes of a password.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// A stored account. `password` always holds a bcrypt hash.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// The authenticated caller of a request, extracted from its session token.
/// Handlers that take a `Principal` argument reject anonymous requests with
/// 401 before they run.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub username: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: usize,  // Expiration time (as UTC timestamp)
    iat: usize,  // Issued at (as UTC timestamp)
    iss: String, // Issuer
    sub: String, // Username
    sid: String, // Session id
}

pub fn create_token(secret: &str, username: &str, hours: i64) -> Result<String, JobStoreError> {
    if !(-MAX_SESSION_HOURS..=MAX_SESSION_HOURS).contains(&hours) {
        return Err(JobStoreError::TokenLifetime { hours });
    }

    let header = TokenHeader::new(Algorithm::HS512);
    let now = chrono::Utc::now();
    let expires = now
        .checked_add_signed(chrono::Duration::hours(hours))
        .ok_or(JobStoreError::TokenLifetime { hours })?;
    let claims = Claims {
        exp: expires.timestamp() as usize,
        iat: now.timestamp() as usize,
        iss: ISSUER.to_owned(),
        sub: username.to_owned(),
        sid: nanoid::nanoid!(),
    };

    encode(
        &header,
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| JobStoreError::Authenticate { source: err })
}

pub fn verify_token(secret: &str, token: &str) -> Result<Principal, JobStoreError> {
    let mut validation = Validation::new(Algorithm::HS512);
    validation.iss = Some(ISSUER.to_owned());

    let token = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| JobStoreError::Authenticate { source: err })?;

    Ok(Principal {
        username: token.claims.sub,
        session_id: token.claims.sid,
    })
}

// The session cookie wins over an Authorization header.
fn read_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty())
        .or_else(|| {
            Authorization::<Bearer>::parse(req)
                .ok()
                .map(|auth| auth.into_scheme().token().to_string())
        })
}

impl actix_web::FromRequest for Principal {
    type Config = ();
    type Error = JobStoreError;
    type Future = future::Ready<Result<Principal, JobStoreError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let principal = req
            .app_data::<web::Data<Context>>()
            .ok_or(JobStoreError::ReadContext {})
            .and_then(|context| {
                let token = read_token(req).ok_or(JobStoreError::MissingSession {})?;
                let principal = verify_token(&context.secret, &token)?;
                debug!(
                    "Authenticated {} with session {}",
                    principal.username, principal.session_id
                );
                Ok(principal)
            });

        future::ready(principal)
    }
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .finish()
}

/// `Set-Cookie` value that makes the browser drop its session cookie.
pub fn expired_session_cookie() -> String {
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict",
        SESSION_COOKIE
    )
}

fn blocking_error(err: BlockingError<bcrypt::BcryptError>) -> JobStoreError {
    match err {
        BlockingError::Error(source) => JobStoreError::HashPassword { source },
        BlockingError::Canceled => JobStoreError::BlockingTask {},
    }
}

/// Hashes on the blocking thread pool, bcrypt is deliberately slow.
pub async fn hash_password(password: String, cost: u32) -> Result<String, JobStoreError> {
    web::block(move || bcrypt::hash(password, cost))
        .await
        .map_err(blocking_error)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, JobStoreError> {
    web::block(move || bcrypt::verify(password, &hash))
        .await
        .map_err(blocking_error)
}

#[cfg(test)]
mod test {
    use super::*;
    use actix_web::test;

    #[test]
    fn test_token_round_trip() {
        let token = create_token("secret", "ada", 24).unwrap();

        let principal = verify_token("secret", &token).unwrap();

        assert_eq!(principal.username, "ada");
        assert!(!principal.session_id.is_empty());
    }

    #[test]
    fn test_each_token_has_its_own_session() {
        let first = verify_token("secret", &create_token("secret", "ada", 1).unwrap()).unwrap();
        let second = verify_token("secret", &create_token("secret", "ada", 1).unwrap()).unwrap();

        assert_ne!(first.session_id, second.session_id);
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let token = create_token("secret", "ada", 24).unwrap();

        let result = verify_token("another secret", &token);

        assert!(matches!(result, Err(JobStoreError::Authenticate { .. })));
    }

    #[test]
    fn test_rejects_expired_token() {
        let token = create_token("secret", "ada", -1).unwrap();

        let result = verify_token("secret", &token);

        assert!(matches!(result, Err(JobStoreError::Authenticate { .. })));
    }

    #[test]
    fn test_rejects_out_of_range_lifetime() {
        for hours in &[MAX_SESSION_HOURS + 1, 10_000_000_000, i64::MAX, i64::MIN] {
            let result = create_token("secret", "ada", *hours);

            assert!(matches!(
                result,
                Err(JobStoreError::TokenLifetime { .. })
            ));
        }

        assert!(create_token("secret", "ada", MAX_SESSION_HOURS).is_ok());
    }

    #[test]
    fn test_reads_token_from_cookie_or_bearer_header() {
        let from_cookie = test::TestRequest::default()
            .cookie(session_cookie("from-cookie".to_owned()))
            .header("authorization", "Bearer from-header")
            .to_http_request();
        let from_header = test::TestRequest::default()
            .header("authorization", "Bearer from-header")
            .to_http_request();
        let anonymous = test::TestRequest::default().to_http_request();

        assert_eq!(read_token(&from_cookie).as_deref(), Some("from-cookie"));
        assert_eq!(read_token(&from_header).as_deref(), Some("from-header"));
        assert_eq!(read_token(&anonymous), None);
    }

    #[actix_rt::test]
    async fn test_password_hashing() {
        let hash = hash_password("hunter22".to_owned(), 4).await.unwrap();

        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22".to_owned(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password("hunter23".to_owned(), hash).await.unwrap());
    }
}
