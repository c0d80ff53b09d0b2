pub mod errors;
pub mod gateway_objects;
pub mod ledger_api;
pub mod payment_flow_api;
pub mod reconciliation;
pub mod settlement;
pub mod webhook_api;
