pub mod frontier_service;
pub mod optimization_service;
pub mod portfolio_service;
pub mod risk_mapping_service;
pub mod statistics_service;
pub mod validation_service;
