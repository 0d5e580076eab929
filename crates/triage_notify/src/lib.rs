pub mod dispatch;
#[cfg(feature = "pagerduty")]
pub mod pagerduty;
pub mod slack;
