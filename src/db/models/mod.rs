pub mod work_session;

pub use work_session::{
    effective_elapsed_ms, NewWorkSession, SessionPatch, SessionStatus, WorkSession,
};
