//! Authenticated request pipeline.
//!
//! `HttpClient` → [`RequestInterceptor`] (attach token) → [`Transport`] →
//! [`RefreshCoordinator`] (401: single-flight refresh, replay once) → caller.

pub mod client;
pub mod coordinator;
pub mod interceptor;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{Download, HttpClient};
pub use coordinator::{Disposition, RefreshCoordinator};
pub use interceptor::RequestInterceptor;
pub use request::{ApiRequest, RequestBody, ResponseType};
pub use response::{ApiResponse, DEFAULT_DOWNLOAD_FILENAME};
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport};
