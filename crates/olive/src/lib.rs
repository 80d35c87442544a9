mod driver;

pub use driver::{
    CheckOptions, CheckResult, DriverError, check_file, check_program, emit_diagnostics,
    init_logging, summary_json,
};
