pub mod features;
pub mod oracle;

pub use features::{api_chart, ApiPoint, FeatureVector};
pub use oracle::{advise, AdvisoryOracle, HttpOracle, Prediction};
