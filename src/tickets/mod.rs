pub mod id;
pub mod model;
pub mod store;

pub use id::{extract_ticket_numbers, TicketId};
pub use model::{ProcessedDevice, ProcessedTicket, Ticket, TicketNote};
pub use store::TicketStore;
