use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset: queue lifecycle events from this
/// crate only, nothing from dependencies.
const DEFAULT_DIRECTIVE: &str = "bbq_core=info";

/// Install a global tracing subscriber for embedders that do not bring their
/// own. The dispatcher never installs one itself; call this once from the
/// host binary (or a test) to see scheduler logs.
///
/// Later calls are no-ops, so tests can call it unconditionally.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
