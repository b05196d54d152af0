//! Build-time metadata embedded by the build script.
//!
//! Provides version, git commit hash, and build profile for the
//! `User-Agent` header sent to the engine and for `keel --version`.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("KEEL_GIT_HASH");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("KEEL_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// The `User-Agent` value attached to every engine request.
pub fn user_agent() -> String {
    format!("keel/{VERSION}")
}
