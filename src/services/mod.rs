pub mod planner;
pub mod reconcile;
pub mod resolver;
pub mod segments;
