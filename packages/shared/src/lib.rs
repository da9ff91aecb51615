//! Utilities shared across SurveyLink packages.

pub mod logger;
pub mod time;
