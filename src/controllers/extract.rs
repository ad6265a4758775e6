//! Request extractors whose rejections render as `BookingError::Validation`,
//! so malformed bodies, path segments and query strings get the same JSON
//! error shape as every other failure.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};

use crate::error::BookingError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(BookingError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(BookingError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(BookingError))]
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for BookingError {
    fn from(rejection: JsonRejection) -> Self {
        BookingError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for BookingError {
    fn from(rejection: PathRejection) -> Self {
        BookingError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for BookingError {
    fn from(rejection: QueryRejection) -> Self {
        BookingError::Validation(rejection.body_text())
    }
}
