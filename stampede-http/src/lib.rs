#![forbid(unsafe_code)]

mod client;
mod error;
mod types;
mod util;

pub use client::{DEFAULT_REQUEST_TIMEOUT, HttpClient};
pub use error::{Error, ErrorKind, Result};
pub use types::{HttpRequest, HttpResponse};
