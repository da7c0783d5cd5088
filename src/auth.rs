//! Caller identity.
//!
//! Identity tokens are HS256 JWTs minted by the hosted auth provider. A
//! token can arrive in the `Authorization` header or in the provider's
//! session cookie. Each location is a [`Strategy`]; they are tried in
//! [`STRATEGIES`] order and the first one yielding an identity wins.

use std::time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH};

use axum::http::{header, HeaderMap};
use jsonwebtoken::Algorithm;

use crate::conf::{self, Conf};

pub type Result<T> = jsonwebtoken::errors::Result<T>;

#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    aud: String,
    iss: String,
    exp: u64,
}

impl Claims {
    pub fn new(
        sub: &str,
        email: Option<&str>,
        ttl: Duration,
        jwt_conf: &conf::Jwt,
    ) -> std::result::Result<Self, SystemTimeError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let exp = now.saturating_add(ttl).as_secs();
        Ok(Self {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            aud: jwt_conf.audience.clone(),
            iss: jwt_conf.issuer.clone(),
            exp,
        })
    }

    pub fn to_str(&self, jwt_conf: &conf::Jwt) -> Result<String> {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            self,
            &jsonwebtoken::EncodingKey::from_secret(
                jwt_conf.secret.as_bytes(),
            ),
        )
    }

    pub fn from_str(str: &str, jwt_conf: &conf::Jwt) -> Result<Self> {
        let mut validation_opts = jsonwebtoken::Validation::new(Algorithm::HS256);
        validation_opts.leeway = 0; // "exp" should mean what it says.
        validation_opts.set_audience(&[&jwt_conf.audience]);
        validation_opts.set_issuer(&[&jwt_conf.issuer]);
        let key =
            jsonwebtoken::DecodingKey::from_secret(jwt_conf.secret.as_bytes());
        let jsonwebtoken::TokenData { claims, .. } =
            jsonwebtoken::decode::<Self>(str, &key, &validation_opts)?;
        Ok(claims)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

impl From<Claims> for Identity {
    fn from(Claims { sub, email, .. }: Claims) -> Self {
        Self { uid: sub, email }
    }
}

pub type Strategy = fn(&HeaderMap, &Conf) -> Option<Identity>;

pub const STRATEGIES: [(&str, Strategy); 2] =
    [("bearer", bearer), ("session_cookie", session_cookie)];

pub fn resolve(headers: &HeaderMap, conf: &Conf) -> Option<Identity> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let identity = strategy(headers, conf)?;
        tracing::debug!(strategy = *name, uid = ?identity.uid, "Resolved identity.");
        Some(identity)
    })
}

pub fn bearer(headers: &HeaderMap, conf: &Conf) -> Option<Identity> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .inspect_err(|error| {
            tracing::warn!(?error, "Invalid Authorization header encoding");
        })
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    verify(token, &conf.jwt)
}

pub fn session_cookie(headers: &HeaderMap, conf: &Conf) -> Option<Identity> {
    let token = cookie(headers, &conf.session_cookie)?;
    verify(token, &conf.jwt)
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find_map(|(k, v)| (k == name).then_some(v.trim_matches('"')))
}

fn verify(token: &str, jwt_conf: &conf::Jwt) -> Option<Identity> {
    if token.is_empty() {
        return None;
    }
    Claims::from_str(token, jwt_conf)
        .inspect_err(|error| {
            tracing::warn!(
                ?error,
                token_prefix = ?token.get(..10).unwrap_or(""),
                "JWT validation failed"
            );
        })
        .ok()
        .map(Identity::from)
}
