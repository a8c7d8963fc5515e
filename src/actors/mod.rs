pub mod match_actor;
pub mod messages;
pub mod registry;
