pub mod exercise;
pub mod from_row;
pub mod logged_set;
pub mod profile;
pub mod session;

pub use exercise::{
    CardioTargets, CrossfitFormat, CrossfitTargets, ExercisePrescription, HiitTargets, Intensity,
    Modality, RehabTargets, RepTarget, Section, StrengthTargets, Targets,
};
pub use from_row::FromSqliteRow;
pub use logged_set::{LoggedSet, SetActuals};
pub use profile::{ExperienceLevel, Units, UserProfile};
pub use session::{
    CompletionStatus, Difficulty, ExerciseCompletion, Session, SessionFeedback, SessionPlan,
    SessionStatus, SessionSummary, SkipReason,
};
