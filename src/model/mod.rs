pub mod candidate;
pub mod result;
pub mod user;

pub use candidate::{Candidate, CandidateValue, Candidates, StudentInfo, UserPredictOutput};
pub use result::{EnrichmentResult, SNAPSHOT_HEADERS};
pub use user::{AnalyticsUser, FileModel, TaskMeta, TaskModel, UserAggregate, UserModel};
