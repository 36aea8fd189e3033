pub mod contract;
pub mod decision;
pub mod portfolio;
pub mod request;
pub mod response;
pub mod signal;
