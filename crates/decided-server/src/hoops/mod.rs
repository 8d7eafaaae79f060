use salvo::prelude::*;
use salvo::size_limiter;

mod auth;
pub use auth::{set_provider, verify_token, IdentityProvider};

#[handler]
pub async fn ensure_accept(req: &mut Request) {
    if req.accept().is_empty() {
        req.headers_mut()
            .insert("Accept", "application/json".parse().expect("should not fail"));
    }
}

#[handler]
pub async fn limit_size(req: &mut Request, depot: &mut Depot, res: &mut Response, ctrl: &mut FlowCtrl) {
    let limiter = size_limiter::max_size(1024 * 1024);
    limiter.handle(req, depot, res, ctrl).await;
}

/// Normalizes a stray `application/json; charset=utf-8` Salvo sometimes
/// emits back to the bare mime type clients expect.
#[handler]
pub async fn remove_json_utf8(req: &mut Request, depot: &mut Depot, res: &mut Response, ctrl: &mut FlowCtrl) {
    ctrl.call_next(req, depot, res).await;
    if let Some(true) = res.headers().get("content-type").map(|h| {
        let h = h.to_str().unwrap_or_default();
        h.contains("application/json") && h.contains(';')
    }) {
        res.add_header("content-type", "application/json", true)
            .expect("should not fail");
    }
}
