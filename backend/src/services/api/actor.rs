use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use common::model::audit::Actor;
use futures_util::future::{ready, Ready};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// The acting user, as forwarded by the authenticating proxy in `X-User-*` headers.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| ApiError::Validation(format!("header {} is not valid text", name))),
    }
}

pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let mut actor = Actor::anonymous();
    if let Some(id) = header_value(headers, USER_ID_HEADER)? {
        actor.id = id.to_string();
    }
    if let Some(email) = header_value(headers, USER_EMAIL_HEADER)? {
        actor.email = email.to_lowercase();
    }
    if let Some(role) = header_value(headers, USER_ROLE_HEADER)? {
        actor.role = role.parse().map_err(ApiError::Validation)?;
    }
    Ok(actor)
}

impl FromRequest for RequestActor {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req.headers()).map(RequestActor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use common::model::user::Role;

    #[test]
    fn test_missing_headers_give_anonymous_operator() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(actor_from_headers(req.headers()).unwrap(), Actor::anonymous());
    }

    #[test]
    fn test_headers_fill_actor() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "u-7"))
            .insert_header((USER_EMAIL_HEADER, "Head@Example.org"))
            .insert_header((USER_ROLE_HEADER, "Admin"))
            .to_http_request();
        let actor = actor_from_headers(req.headers()).unwrap();
        assert_eq!(actor.id, "u-7");
        assert_eq!(actor.email, "head@example.org");
        assert_eq!(actor.role, Role::Admin);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let req = TestRequest::default()
            .insert_header((USER_ROLE_HEADER, "superuser"))
            .to_http_request();
        assert!(matches!(
            actor_from_headers(req.headers()),
            Err(ApiError::Validation(_))
        ));
    }
}
