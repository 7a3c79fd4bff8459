//! `{ "data": ... }` envelope for successful JSON responses.
//!
//! Errors use the `{ "error", "code" }` shape produced by
//! [`AppError`](crate::error::AppError); raw proxied image bytes are not
//! wrapped at all.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    /// Wrap `data` and return it ready for a handler.
    pub fn json(data: T) -> Json<Self> {
        Json(Self { data })
    }
}
