pub mod routes;

pub use routes::{REMOTE_ENTRY_PATH, router, serve};
