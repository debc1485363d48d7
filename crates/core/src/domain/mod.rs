pub mod contract;
pub mod order;
pub mod policy;
pub mod portfolio;
pub mod risk;
pub mod sentiment;
