//! Stand-alone `keel` binary.
//!
//! It declares no targets of its own, so it is mostly useful for the
//! `artifacts` commands generated pipelines call and for generating
//! pipelines from `[[workflows]]` in `keel.toml`. Build programs embed
//! [`keel::Build`] instead.

fn main() {
    // Tracing may not be initialized yet, or may be the thing that panicked.
    #[allow(clippy::print_stderr)]
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("keel panicked: {panic_info}");
        eprintln!("Run with RUST_LOG=debug for more information.");
    }));

    std::process::exit(keel::Build::new().run());
}
