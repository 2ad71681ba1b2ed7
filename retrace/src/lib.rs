// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    InitOutcome, format_resolution, inspect_snapshot, load_capture, load_cookies,
    parse_input_assignment, parse_inputs, resolve_values, select_api_key, write_default_config,
};
