/// Initialise `env_logger` on stderr. `RUST_LOG` still refines per-module levels.
pub fn init(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // A second init (tests, embedding) is harmless; keep the first logger.
    let _ = env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .filter_level(level)
        .format_timestamp(None)
        .try_init();
}
