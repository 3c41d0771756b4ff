//! Core utilities shared by the engine and the backends: transport, client,
//! response parsing, retries and timing.

pub mod client;
pub mod reqwest_transport;
pub mod response;
pub mod retry;
pub mod timing;
pub mod transport;

pub use client::{
    CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_ACCEPT_LANGUAGE, HEADER_CSRF,
    HEADER_DO_NOT_TRACK, HEADER_LOCATION, HEADER_REFERER, HEADER_UPGRADE_INSECURE_REQUESTS,
    HEADER_USER_AGENT, Interceptor, PortalClient, RegisteredInterceptor, RequestBuilder,
};
pub use reqwest_transport::ReqwestTransport;
pub use response::{PortalResponse, ResponseParseError, origin_from_url};
pub use retry::{RETRY_BACKOFF, with_retries};
pub use timing::{RandomDelay, sleep_cancellable};
pub use transport::{HttpTransport, PortalRequest, TransportError};
