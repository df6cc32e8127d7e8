//! Session storage for the Pharos framework.
//!
//! Session state is an arbitrary mapping of string keys to JSON values,
//! scoped to one connection. Two storage strategies are provided:
//!
//! - **Client-side** ([`CookieBackend`]): the serialized session travels in
//!   cookies, split into `{key}-{n}` segments when it exceeds one cookie's
//!   size budget. Fully stateless between requests.
//! - **Server-side** ([`ServerSideBackend`]): a single cookie holds an opaque
//!   session id; the data lives in any store implementing [`SessionStorage`]
//!   (an in-process [`MemoryStorage`] is included).
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use pharos_core::App;
//! use pharos_session::{CookieBackend, CookieBackendConfig, SessionConfig, SessionMiddleware};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session")))?;
//! let app = App::builder()
//!     .middleware(SessionMiddleware::factory(Arc::new(backend))?)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod cookie_backend;
pub mod error;
pub mod memory;
pub mod middleware;
pub mod server_side;

pub use backend::{SessionBackend, SessionData};
pub use config::{SessionConfig, ONE_DAY_IN_SECONDS};
pub use cookie_backend::{CookieBackend, CookieBackendConfig, PayloadCodec, CHUNK_SIZE};
pub use error::{SessionError, SessionResult};
pub use memory::MemoryStorage;
pub use middleware::SessionMiddleware;
pub use server_side::{generate_session_id, ServerSideBackend, ServerSideConfig, SessionStorage};
