pub mod bounce;
pub mod churn;
pub mod click_through;
pub mod common;
pub mod events;
pub mod funnel;
pub mod health;
pub mod paths;
pub mod revenue;
