use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";
const DEBUG_FILTER: &str = "warn,checks4shell_core=debug,checks4shell_cli=debug";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug { DEBUG_FILTER } else { DEFAULT_FILTER }
}

/// Installs the global subscriber. Logs always go to stderr because stdout
/// carries the supervised command's output.
///
/// A subscriber that is already installed, e.g. by an embedding host or a
/// previous call, is kept.
pub fn init(debug: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .try_init()
    {
        eprintln!("checks4shell: logging disabled: {err}");
    }
}
