//! Identity verification (spec §1 "out of scope... core calls
//! `verify(token) → user_id | error` and trusts the result"). This hoop is
//! the one place that boundary is crossed: everything past it deals only in
//! [`decided_core::ids::UserId`].

use std::str::FromStr;
use std::sync::OnceLock;

use decided_core::error::CoreError;
use decided_core::ids::UserId;
use salvo::http::headers::authorization::{Authorization, Bearer};
use salvo::http::headers::HeaderMapExt;
use salvo::prelude::*;

use crate::exts::AuthedUser;
use crate::AppResult;

/// Pluggable identity backend. The engine trusts whatever `UserId` this
/// returns; it never inspects the token itself.
pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, CoreError>;
}

/// Development/test provider: the bearer token *is* the user id, formatted
/// as a UUID. A deployment fronting a real identity service swaps this out
/// via [`set_provider`] before the server starts serving requests.
pub struct BearerUuidProvider;

impl IdentityProvider for BearerUuidProvider {
    fn verify(&self, token: &str) -> Result<UserId, CoreError> {
        UserId::from_str(token).map_err(|_| CoreError::Unauthorized)
    }
}

static PROVIDER: OnceLock<Box<dyn IdentityProvider>> = OnceLock::new();

/// Installs the identity provider used by [`verify_token`]. Must be called
/// at most once, before the server starts accepting connections.
pub fn set_provider(provider: Box<dyn IdentityProvider>) {
    PROVIDER.set(provider).ok();
}

fn provider() -> &'static dyn IdentityProvider {
    PROVIDER.get_or_init(|| Box::new(BearerUuidProvider)).as_ref()
}

#[handler]
pub async fn verify_token(req: &mut Request, depot: &mut Depot) -> AppResult<()> {
    let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() else {
        return Err(CoreError::Unauthorized.into());
    };
    let user_id = provider().verify(bearer.token())?;
    depot.inject(AuthedUser { user_id });
    Ok(())
}
