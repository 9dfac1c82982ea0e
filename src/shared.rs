pub mod logging;

pub use logging::{append_session_log_line, session_log_path};
