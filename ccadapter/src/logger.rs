use logforth::append;

/// Initializes the global logger; call once before the runtime starts.
pub fn init(filter: &str) {
    let level = filter.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("unrecognized log filter '{filter}', falling back to info");
        log::LevelFilter::Info
    });

    logforth::builder()
        .dispatch(|dispatch| dispatch.filter(level).append(append::Stderr::default()))
        .apply();
}
