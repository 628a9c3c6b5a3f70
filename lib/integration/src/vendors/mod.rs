//! Concrete vendor adapters.

pub mod hubspot;
pub mod salesforce;

pub use hubspot::{HubspotAdapter, HubspotAuth, HubspotSettings};
pub use salesforce::{SalesforceAdapter, SalesforceSettings};
