use std::any::Any;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to stderr so stdout carries only the report.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for the opskit
/// crates when `verbose`.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "info,opskit_core=debug,opskit_cli=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .compact()
        .try_init();
}

/// Log panics through tracing so they land next to the run's other output.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let thread = std::thread::current();
        let thread = thread.name().unwrap_or("unnamed");
        let payload = panic_message(info.payload());

        match info.location() {
            Some(at) => tracing::error!(
                thread,
                file = at.file(),
                line = at.line(),
                payload,
                "opskit-migrate panicked"
            ),
            None => tracing::error!(thread, payload, "opskit-migrate panicked"),
        }
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string payload>"
    }
}
