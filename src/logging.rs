use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: Once = Once::new();

/// Installs a stderr subscriber filtered by `filter` (an `EnvFilter` directive
/// such as `midas=debug`). Does nothing without a filter; later calls are ignored.
pub fn init(filter: Option<&str>) {
    let Some(directives) = filter.filter(|f| !f.trim().is_empty()) else {
        return;
    };
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("warning: ignoring invalid log filter `{directives}`: {err}");
            EnvFilter::new("warn")
        });
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    });
}
