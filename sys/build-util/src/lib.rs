//! Board configuration for the serial greeter, for use from build scripts.
//!
//! The board is described in a KDL file (`board.kdl` next to the firmware's
//! `Cargo.toml` unless `BOARD_CONFIG` names another). Build scripts load it
//! here, and get back either a checked [`BoardConfig`] or a diagnostic
//! pointing at the problem.

pub mod board;
pub mod embed;

use std::path::PathBuf;

use miette::{Context as _, IntoDiagnostic as _, NamedSource};

pub use board::BoardConfig;

/// Environment variable that overrides the board config path.
pub const BOARD_CONFIG_VAR: &str = "BOARD_CONFIG";

/// Works out which board config file the current build script should read.
///
/// This will emit a Cargo build script directive to stdout, ensuring that your
/// build script will be re-run if the choice changes.
pub fn board_config_path() -> PathBuf {
    println!("cargo::rerun-if-env-changed={BOARD_CONFIG_VAR}");
    match std::env::var_os(BOARD_CONFIG_VAR) {
        Some(path) => PathBuf::from(path),
        None => {
            let dir = std::env::var_os("CARGO_MANIFEST_DIR")
                .expect("not running under cargo");
            PathBuf::from(dir).join("board.kdl")
        }
    }
}

/// Loads and checks the board config for the current build script.
///
/// Also tells Cargo to re-run the build script if the file changes.
pub fn load_board_config() -> miette::Result<BoardConfig> {
    let path = board_config_path();
    println!("cargo::rerun-if-changed={}", path.display());

    let text = std::fs::read_to_string(&path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    BoardConfig::parse(&text).map_err(|e| {
        e.with_source_code(NamedSource::new(path.display().to_string(), text))
    })
}

/// Loads the board config and writes `board_config.rs` into `OUT_DIR`.
///
/// Panics with the full diagnostic on any problem, which is how a build
/// script reports failure.
pub fn generate_board_config() -> BoardConfig {
    let config = match load_board_config() {
        Ok(c) => c,
        Err(e) => panic!("bad board config: {e:?}"),
    };

    let mut out = PathBuf::from(std::env::var_os("OUT_DIR").expect("not running under cargo"));
    out.push("board_config.rs");

    let mut text = Vec::new();
    config.write_config_module(&mut text).expect("writing to a Vec can't fail");
    std::fs::write(&out, text).expect("can't write board_config.rs");
    config
}
