pub mod catalog;
pub mod invite_log;
pub mod invoice;

pub use catalog::{Catalog, CatalogGroup};
pub use invite_log::InviteLog;
pub use invoice::{Invoice, InvoiceStatus, PaymentTransition};
