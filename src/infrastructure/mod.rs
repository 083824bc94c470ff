pub mod cart_repo;
pub mod garanzia3;
pub mod models;
pub mod order_repo;
pub mod outbox;
pub mod payment;
pub mod payment_repo;
pub mod warranty_repo;

#[cfg(test)]
pub(crate) mod test_db;
