use decided_core::error::CoreError;
use decided_core::ids::UserId;
use salvo::prelude::*;

use crate::AppResult;

/// Injected into the depot by [`crate::hoops::auth::verify_token`] once a
/// request's bearer token has been resolved to a stable user id. Every
/// handler past that hoop can assume this is present.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser {
    pub user_id: UserId,
}

pub trait DepotExt {
    fn user_id(&self) -> AppResult<UserId>;
}

impl DepotExt for Depot {
    fn user_id(&self) -> AppResult<UserId> {
        self.obtain::<AuthedUser>()
            .map(|authed| authed.user_id)
            .map_err(|_| CoreError::Unauthorized.into())
    }
}
