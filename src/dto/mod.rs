pub mod balance;
pub mod cards;
pub mod orders;
pub mod products;
pub mod users;
