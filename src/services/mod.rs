pub mod availability;
pub mod booking;
pub mod cart;
pub mod orders;

pub use availability::SeatResolver;
pub use booking::BookingService;
pub use cart::CartManager;
pub use orders::OrderFinalizer;
