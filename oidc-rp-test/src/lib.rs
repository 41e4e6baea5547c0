mod app;
mod provider;

pub use app::{resolve_path, TestApp, TestRequest, TestResponse};
pub use provider::{MockProvider, TokenRequestRecord};
