pub mod event;
pub mod invoice;
pub mod item;
pub mod party;

pub use event::{EventStatus, EventType, InvoiceEvent, NewEvent};
pub use invoice::{AuthorityStamp, Invoice, InvoiceRef, InvoiceStatus, NewInvoice};
pub use item::{InvoiceItem, NewItem};
pub use party::{Customer, Organization};
