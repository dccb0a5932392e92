//! Database entities backing orders, promotions, carts and the coin ledger.

pub mod cart_item;
pub mod coin_account;
pub mod coin_transaction;
pub mod generated_content;
pub mod order;
pub mod order_item;
pub mod product;
pub mod promo_code;
