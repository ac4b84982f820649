/// Fatal error reporting.
///
/// Every error reaches stderr as one human-readable line. Validation and fatal
/// system errors also carry a backtrace of the point of report; the sandboxed
/// program never sees any of it because reporting ends in `abort()`.
use crate::config::types::{CordonError, ErrorClass, TOOL_NAME};
use std::backtrace::Backtrace;
use std::io::Write;

/// Whether errors of this class are reported with a backtrace.
pub fn wants_backtrace(class: ErrorClass) -> bool {
    matches!(class, ErrorClass::Validation | ErrorClass::FatalSystem)
}

/// Text printed for `error`.
pub fn render(error: &CordonError, backtrace: Option<&Backtrace>) -> String {
    let mut text = format!("{}: {}\n", TOOL_NAME, error);
    if let Some(backtrace) = backtrace {
        text.push_str("backtrace:\n");
        text.push_str(&backtrace.to_string());
        if !text.ends_with('\n') {
            text.push('\n');
        }
    }
    text
}

/// Print `error` to stderr, with a backtrace when its class calls for one.
pub fn report(error: &CordonError) {
    let backtrace = wants_backtrace(error.class()).then(Backtrace::force_capture);
    let text = render(error, backtrace.as_ref());
    let mut stderr = std::io::stderr().lock();
    // Nothing left to report a failed write to.
    let _ = stderr.write_all(text.as_bytes());
    let _ = stderr.flush();
}

/// Report and terminate with SIGABRT.
pub fn abort_with(error: &CordonError) -> ! {
    log::error!("Aborting: {}", error);
    report(error);
    std::process::abort()
}
