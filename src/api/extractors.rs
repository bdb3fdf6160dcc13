use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use super::error::ApiError;
use crate::domain::order::{Actor, ActorRole};

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// Caller identity as resolved by the upstream identity service. Headers
/// are trusted as given; credentials are never checked here.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub Actor);

impl FromRequest for AuthenticatedActor {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req).map(AuthenticatedActor))
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, ApiError> {
    req.headers()
        .get(name)
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated(format!("{name} header is not valid text")))
}

fn actor_from_headers(req: &HttpRequest) -> Result<Actor, ApiError> {
    let id = Uuid::parse_str(header(req, ACTOR_ID_HEADER)?.trim())
        .map_err(|_| ApiError::Unauthenticated(format!("{ACTOR_ID_HEADER} is not a UUID")))?;
    let role: ActorRole = header(req, ACTOR_ROLE_HEADER)?
        .trim()
        .parse()
        .map_err(|e| ApiError::Unauthenticated(format!("{e}")))?;

    Ok(Actor::new(id, role))
}
