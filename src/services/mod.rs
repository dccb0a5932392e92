// Read-only catalog lookups
pub mod catalog;

// Ordering
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod promotions;

// Settlement and coins
pub mod ledger;
pub mod settlement;

// Coin-billed content
pub mod generation;
