//! Service layer for the inventory accounting core

pub mod balance;
pub mod count;
pub mod ledger;
pub mod numbering;
pub mod order;
pub mod reservation;

pub use balance::BalanceService;
pub use count::CountService;
pub use ledger::LedgerService;
pub use numbering::NumberingService;
pub use order::OrderService;
pub use reservation::ReservationService;
