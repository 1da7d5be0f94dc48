pub mod profile_repo;
pub mod session_repo;

pub use profile_repo::ProfileRepository;
pub use session_repo::SessionRepository;
