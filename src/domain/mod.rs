pub mod cart;
pub mod errors;
pub mod order;
pub mod payment;
pub mod ports;
pub mod warranty;

/// One page of a listing together with the unpaginated row count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
