//! Lifecycle status sink
//!
//! The embedding application supplies a print callback taking
//! `(message, verbose)`. Connection milestones are reported through it, and
//! never per relayed message.

use std::fmt;
use std::sync::Arc;

/// Callback receiving a status line and the monitor's verbose flag
pub type PrintCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Default callback: print to stdout, but only when verbose
pub fn default_print_callback() -> PrintCallback {
    Arc::new(|message: &str, verbose: bool| {
        if verbose {
            println!("{message}");
        }
    })
}

/// Print callback bound to a verbose flag
#[derive(Clone)]
pub struct StatusSink {
    callback: PrintCallback,
    verbose: bool,
}

impl StatusSink {
    pub fn new(callback: PrintCallback, verbose: bool) -> Self {
        Self { callback, verbose }
    }

    pub fn emit(&self, message: &str) {
        (self.callback)(message, self.verbose);
    }
}

impl Default for StatusSink {
    fn default() -> Self {
        Self::new(default_print_callback(), false)
    }
}

impl fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusSink")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}
