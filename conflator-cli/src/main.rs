//! Entry point for the `osm-conflator` binary.
#![forbid(unsafe_code)]

fn main() {
    env_logger::init();
    if let Err(err) = conflator_cli::run() {
        eprintln!("osm-conflator: {err}");
        std::process::exit(1);
    }
}
