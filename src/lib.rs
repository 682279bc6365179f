pub mod dashboard;
pub mod drilldown;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod planner;
pub mod query;
pub mod respond;
pub mod settings;
pub mod text;
