pub mod orchestrator;
pub mod pool;
pub mod storage;

pub use orchestrator::{
    Campaign, CampaignOutcome, CampaignSpec, CampaignState, FailurePolicy,
};
pub use pool::{CampaignPool, TaskOutcome, TaskStatus};
pub use storage::OutputLayout;
