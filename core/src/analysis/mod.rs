//! Threshold calibration on noise-only statistics and detection-probability
//! curves over a stimulus sweep.

pub mod curve;
pub mod discovery;
pub mod threshold;

pub use curve::{detection_probability, CurvePoint, PerformanceCurve};
pub use discovery::{
    analyze_campaign, analyze_directory, analyze_vectors, discover_campaigns, write_report,
    AnalysisParams, CampaignAnalysis, DiscoveredCampaign,
};
pub use threshold::{EmpiricalCdf, Threshold};
