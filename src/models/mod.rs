pub mod cart;
pub mod order;
pub mod page;
pub mod seat;
pub mod show;

pub use cart::{Cart, CartItem};
pub use order::{Order, Ticket};
pub use page::{Page, PageRequest};
pub use seat::{Seat, SeatAvailability};
pub use show::Show;

pub type UserId = i64;
pub type ShowId = i64;
pub type SeatId = i64;
pub type TheaterId = i64;
pub type OrderId = i64;
pub type TicketId = i64;
