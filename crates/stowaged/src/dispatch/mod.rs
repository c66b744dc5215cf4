//! JSONL request dispatch over standard input and output.
//!
//! The host writes one request per line:
//!
//! ```json
//! {"user":"alice","conversation":"c1","operation":"edit_open","zone":"documents","path":"notes.md"}
//! ```
//!
//! and reads exactly one envelope per line in reply, in request order:
//!
//! ```json
//! {"success":true,"data":{"path":"notes.md","lock":"opened"},"message":"Opened for editing: notes.md"}
//! ```
//!
//! Requests are served one at a time. Lines that cannot be parsed yield an
//! `INVALID_REQUEST` envelope and do not end the session; only a broken
//! stream does.

mod errors;
mod handler;
mod request;
mod response;
mod router;

pub use self::errors::DispatchError;
pub use self::handler::{BASE_REQUEST_BYTES, request_limit, serve};
pub use self::request::{Operation, Request};
pub use self::response::ResponseWriter;
pub use self::router::route;
