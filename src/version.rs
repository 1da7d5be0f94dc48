/// Git version string set by build.rs.
pub const GIT_VERSION: &str = env!("GIT_VERSION");
