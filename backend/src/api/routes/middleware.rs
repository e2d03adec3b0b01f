//! # Authentification des requêtes
//!
//! Deux extracteurs actix :
//! - `AuthenticatedOfferer` : clé d'API partenaire `Authorization: Bearer <clé>`
//! - `BackofficeUser` : jeton JWT d'un agent ayant le rôle `ADMIN`
//!
//! Une route est protégée dès qu'elle prend l'un d'eux en paramètre.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::api::AppState;
use crate::infrastructure::error::{internal_error, AppError, AppResult};

/// Structure propriétaire de la clé d'API présentée
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedOfferer {
    pub offerer_id: i64,
    pub api_key_id: i64,
}

/// Agent connecté au backoffice
#[derive(Debug, Clone)]
pub struct BackofficeUser {
    pub user_id: i64,
    pub email: String,
}

fn bearer_token(req: &HttpRequest) -> AppResult<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("En-tête Authorization manquant ou invalide".to_string()))
}

fn app_state(req: &HttpRequest) -> AppResult<web::Data<AppState>> {
    req.app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| internal_error("État applicatif non configuré"))
}

impl FromRequest for AuthenticatedOfferer {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = app_state(req);
        Box::pin(async move {
            let (token, state) = (token?, state?);
            let key = state.offerers.authenticate_api_key(&token).await?;
            Ok(AuthenticatedOfferer {
                offerer_id: key.offerer_id,
                api_key_id: key.id,
            })
        })
    }
}

impl FromRequest for BackofficeUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = bearer_token(req).and_then(|token| {
            let claims = app_state(req)?.users.authorize_admin(&token)?;
            Ok(BackofficeUser {
                user_id: claims.sub,
                email: claims.email,
            })
        });
        ready(user)
    }
}
